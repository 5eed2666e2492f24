//! Math backend and small numeric helpers shared by the wavetable and DDS code.
//!
//! Design goals:
//! - `no_std` ready (guarded by the crate feature `no-std`)
//! - Math backend selection that works in both `std` and `no_std` contexts
//! - Side-effect free helpers that are easy to test
//!
//! Samples are `f64` throughout: DAQ cards report voltages in double precision
//! and the output path converts at the device boundary only.

use cfg_if::cfg_if;

// ----------------------------- Math backend selection -----------------------------

cfg_if! {
    // micromath preferred if explicitly requested (works in no_std, f32 only)
    if #[cfg(feature = "micromath")] {
        use micromath::F32Ext as _;
        #[inline] fn m_sin(x: f64) -> f64 { f64::from((x as f32).sin()) }
    // libm (C math) in no_std
    } else if #[cfg(feature = "no-std")] {
        #[inline] fn m_sin(x: f64) -> f64 { libm::sin(x) }
    // std backend
    } else {
        #[inline] fn m_sin(x: f64) -> f64 { x.sin() }
    }
}

// --------------------------------- Constants -------------------------------------

/// Sample type carried by every block in the pipeline.
pub type Sample = f64;

/// 2π (commonly useful)
pub const TAU: f64 = core::f64::consts::TAU;

// --------------------------------- Utilities -------------------------------------

/// Sine through the selected math backend.
#[inline]
pub fn sin(x: f64) -> f64 {
    m_sin(x)
}

#[inline]
pub fn clamp(x: f64, lo: f64, hi: f64) -> f64 {
    if x < lo { lo } else if x > hi { hi } else { x }
}

/// Wrap phase into [0, 1).
#[inline]
pub fn wrap_phase01(p: f64) -> f64 {
    let w = p - (p as i64) as f64;
    if w < 0.0 { w + 1.0 } else { w }
}

// --------------------------------- Simple meters ---------------------------------

/// Largest absolute value in `xs` (0.0 for an empty slice).
#[inline]
pub fn peak_abs(xs: &[Sample]) -> Sample {
    xs.iter().fold(0.0, |acc, &x| {
        let a = if x >= 0.0 { x } else { -x };
        if a > acc { a } else { acc }
    })
}

// --------------------------------- Tests (std only) ------------------------------
