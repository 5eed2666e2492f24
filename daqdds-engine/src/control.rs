//! Line-oriented controller for a supervised pipeline.
//!
//! Reads commands from any `BufRead` and answers on any `Write`, so the same
//! loop serves stdin/stdout and tests.

use std::io::{BufRead, Write};

use tracing::{debug, info};

use crate::error::StreamResult;
use crate::shared::SharedControlState;

pub const PROMPT: &str = "analog i/o prompt >>>> ";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Stop,
    Settings,
    Unrecognized(String),
}

impl Command {
    /// `q | quit | stop` and `s | settings`; surrounding whitespace is ignored.
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            "q" | "quit" | "stop" => Command::Stop,
            "s" | "settings" => Command::Settings,
            other => Command::Unrecognized(other.to_string()),
        }
    }
}

/// Run the prompt until a stop command (or end of input) sets the stop flag.
///
/// Returns the number of commands handled. Only I/O failures on `input` or
/// `out` are errors; unknown commands are reported and the loop continues.
pub fn run_controller<R: BufRead, W: Write>(
    state: &SharedControlState,
    mut input: R,
    mut out: W,
) -> StreamResult<usize> {
    writeln!(out, "Started analog in/out")?;
    let mut handled = 0;
    let mut line = String::new();

    while !state.stop_requested() {
        write!(out, "{PROMPT}")?;
        out.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            info!("controller input closed, stopping");
            state.request_stop();
            break;
        }
        handled += 1;

        match Command::parse(&line) {
            Command::Stop => {
                info!(counter = state.counter(), "stop requested");
                state.request_stop();
            }
            Command::Settings => {
                write!(out, "{}", state.snapshot())?;
            }
            Command::Unrecognized(cmd) => {
                debug!(%cmd, "unrecognized command");
                writeln!(out, "Input '{cmd}' is not recognized.")?;
            }
        }
    }
    out.flush()?;
    Ok(handled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_commands() {
        assert_eq!(Command::parse("q\n"), Command::Stop);
        assert_eq!(Command::parse(" quit "), Command::Stop);
        assert_eq!(Command::parse("stop"), Command::Stop);
        assert_eq!(Command::parse("s"), Command::Settings);
        assert_eq!(Command::parse("settings\r\n"), Command::Settings);
        assert_eq!(Command::parse("Stop"), Command::Unrecognized("Stop".into()));
        assert_eq!(Command::parse(""), Command::Unrecognized(String::new()));
    }

    #[test]
    fn session_until_stop() {
        let state = SharedControlState::new();
        let mut out = Vec::new();
        let n = run_controller(&state, Cursor::new("hello\ns\nq\nnever read\n"), &mut out).unwrap();
        assert_eq!(n, 3);
        assert!(state.stop_requested());

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Started analog in/out\nanalog i/o prompt >>>> "));
        assert!(text.contains("Input 'hello' is not recognized.\n"));
        assert!(text.contains("status: starting\n"));
        assert!(!text.contains("never read"));
        assert_eq!(text.matches(PROMPT).count(), 3);
    }

    #[test]
    fn end_of_input_stops() {
        let state = SharedControlState::new();
        let n = run_controller(&state, Cursor::new(""), Vec::new()).unwrap();
        assert_eq!(n, 0);
        assert!(state.stop_requested());
    }

    #[test]
    fn already_stopped_skips_prompt() {
        let state = SharedControlState::new();
        state.request_stop();
        let mut out = Vec::new();
        run_controller(&state, Cursor::new("s\n"), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Started analog in/out\n");
    }
}
