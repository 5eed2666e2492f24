use std::io::Cursor;
use std::thread;
use std::time::{Duration, Instant};

use daqdds_core::dds::Dds;
use daqdds_core::dsp::Sample;
use daqdds_core::wavetable::Wave;
use daqdds_engine::sim::{SimEvent, SimInput, SimOutput, SimProbe, SimSignal};
use daqdds_engine::{
    supervise, ConfigurationError, DeviceError, PipelineConfig, StreamCoordinator, StreamError, StreamResult,
    StreamState, Supervisor, WorkerStatus,
};

fn sim_pair(probe: &SimProbe, rate: u32, block: usize) -> (SimInput, SimOutput) {
    let input = SimInput::open("Dev2/ai0:15", rate, block).unwrap().with_probe(probe);
    let output = SimOutput::open("Dev3/ao0:7", rate).unwrap().with_probe(probe);
    (input, output)
}

#[test]
fn thousand_iterations_one_write_per_acquire() {
    let probe = SimProbe::new();
    let (input, output) = sim_pair(&probe, 10_000, 10);
    let mut c = StreamCoordinator::new(input, output);

    assert_eq!(c.run(|n| n < 1000).unwrap(), 1000);

    let events = probe.events();
    assert_eq!(events.len(), 2000);
    for (i, pair) in events.chunks(2).enumerate() {
        let seq = i as u64;
        assert_eq!(pair[0], SimEvent::Acquired { seq, frames: 10 });
        assert_eq!(pair[1], SimEvent::Written { seq, channels: 8, frames: 10 });
    }
}

#[test]
fn pass_through_is_sample_exact() {
    let probe = SimProbe::new();
    let input = SimInput::open("Dev2/ai0:15", 1000, 7)
        .unwrap()
        .with_signal(SimSignal::Sine { hz: 13.0, amplitude: 2.0 });
    let reference = {
        let mut twin = SimInput::open("Dev2/ai0:15", 1000, 7)
            .unwrap()
            .with_signal(SimSignal::Sine { hz: 13.0, amplitude: 2.0 });
        (0..5).map(|_| daqdds_engine::AcquisitionSource::acquire(&mut twin).unwrap()).collect::<Vec<_>>()
    };
    let output = SimOutput::open("Dev3/ao0:7", 1000).unwrap().with_probe(&probe);
    StreamCoordinator::new(input, output).run(|n| n < 5).unwrap();

    for (written, acquired) in probe.written_blocks().iter().zip(&reference) {
        assert_eq!(Some(written.clone()), acquired.clone().select_channels(8));
    }
}

#[test]
fn dds_output_scenario_a() {
    // Ws=100, N=1000, Fs=10000: skip 10, every 10th table point.
    let probe = SimProbe::new();
    let (input, output) = sim_pair(&probe, 10_000, 10);
    let table: Vec<Sample> = (0..1000).map(|i| i as Sample).collect();
    let dds = Dds::new(table, 100.0, 10_000).unwrap();
    let mut c = StreamCoordinator::new(input, output).with_synthesizer(dds);

    c.run(|n| n < 12).unwrap();
    let written = probe.written_blocks();
    assert_eq!(written.len(), 12);

    let all: Vec<Sample> = written.iter().flat_map(|b| b.channel(0).to_vec()).collect();
    let expected: Vec<Sample> = (0..120).map(|k| ((k * 10) % 1000) as Sample).collect();
    assert_eq!(all, expected);
    for block in &written {
        for row in block.rows() {
            assert_eq!(row, block.channel(0));
        }
    }
}

#[test]
fn dds_sine_stays_in_amplitude() {
    let probe = SimProbe::new();
    let (input, output) = sim_pair(&probe, 1000, 1);
    let dds = Dds::new(Wave::Sine.table(1000, 0.5), 100.0, 1000).unwrap();
    StreamCoordinator::new(input, output).with_synthesizer(dds).run(|n| n < 200).unwrap();

    let written = probe.written_blocks();
    assert_eq!(written.len(), 200);
    assert!(written.iter().all(|b| b.frames() == 1 && b.channels() == 8));
    assert!(written.iter().all(|b| b.as_slice().iter().all(|v| v.abs() <= 0.5)));
}

#[test]
fn device_failure_tears_down() {
    let probe = SimProbe::new();
    let input = SimInput::open("Dev2/ai0:15", 1000, 10).unwrap().with_probe(&probe);
    let output = SimOutput::open("Dev3/ao0:7", 1000).unwrap().with_probe(&probe).with_underrun_after(3);
    let mut c = StreamCoordinator::new(input, output);

    let err = c.run(|_| true).unwrap_err();
    assert!(matches!(err, StreamError::DeviceIo(DeviceError::Underrun { .. })));
    assert_eq!(c.state(), StreamState::Stopped);
    assert_eq!(c.iterations(), 3);
    assert!(!probe.input_open());
    assert!(!probe.output_open());
}

#[test]
fn shutdown_within_one_period() {
    // 50 ms blocks; the worker must notice the stop at the next block boundary.
    let probe = SimProbe::new();
    let worker_probe = probe.clone();
    let sup = Supervisor::spawn(move || -> StreamResult<StreamCoordinator<SimInput, SimOutput>> {
        let input = SimInput::open("Dev2/ai0:15", 1000, 50)?.paced(true).with_probe(&worker_probe);
        let output = SimOutput::open("Dev3/ao0:7", 1000)?.with_probe(&worker_probe);
        Ok(StreamCoordinator::new(input, output))
    })
    .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while sup.state().counter() < 2 {
        assert!(Instant::now() < deadline);
        thread::sleep(Duration::from_millis(2));
    }

    let requested = Instant::now();
    sup.request_stop();
    let report = sup.join().unwrap();
    let latency = requested.elapsed();

    assert!(latency < Duration::from_millis(50 + 40), "stop took {latency:?}");
    assert!(!probe.input_open() && !probe.output_open());
    assert_eq!(report.snapshot.status, WorkerStatus::Finished);
    let writes = probe.events().iter().filter(|e| matches!(e, SimEvent::Written { .. })).count() as u64;
    assert_eq!(writes, report.iterations);
}

#[test]
fn supervised_session_from_config() {
    let config = PipelineConfig::from_json_str(r#"{ "sample_rate": 1000, "block_size": 5 }"#).unwrap();
    let sup = Supervisor::spawn(move || Ok(config.open()?)).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while sup.state().counter() == 0 {
        assert!(Instant::now() < deadline);
        thread::sleep(Duration::from_millis(2));
    }

    let mut out = Vec::new();
    sup.control(Cursor::new("x\nsettings\nstop\n"), &mut out).unwrap();
    let report = sup.join().unwrap();

    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("Started analog in/out\n"));
    assert!(text.contains("Input 'x' is not recognized.\n"));
    assert!(text.contains("status: running\n"), "{text}");
    assert!(text.contains("  physical_channels: Dev2/ai0:15\n"));
    assert!(text.contains("  sample_block_size: 5\n"));
    assert!(text.contains("  physical_channels: Dev3/ao0:7\n"));
    assert!(!text.contains("settings: not negotiated"));

    assert!(report.snapshot.stop_requested);
    assert_eq!(report.snapshot.counter, report.iterations);
    let settings = report.snapshot.settings.unwrap();
    assert_eq!(settings.ai.sample_block_size, Some(5));
    assert_eq!(settings.ao.sample_rate, 1000);
}

#[test]
fn oversized_block_fails_before_streaming() {
    let config = PipelineConfig::from_json_str(r#"{ "sample_rate": 100, "block_size": 501 }"#).unwrap();
    let err = supervise(move || Ok(config.open()?), Cursor::new("stop\n"), Vec::new()).unwrap_err();
    assert!(matches!(
        err,
        StreamError::Configuration(ConfigurationError::BlockTooLarge { block_size: 501, capacity: 500 })
    ));
}

#[test]
fn closed_controller_input_stops_worker() {
    let config = PipelineConfig { sample_rate: 1000, ..PipelineConfig::default() };
    let report = supervise(move || Ok(config.open()?), Cursor::new(""), Vec::new()).unwrap();
    assert!(report.snapshot.stop_requested);
    assert_eq!(report.snapshot.status, WorkerStatus::Finished);
}
