// ── Battery calibration ──
//
// The raw telemetry systematically overestimates the remaining charge
// by 5-9%. These coefficients were fit offline against multimeter
// ground truth on real devices and are a versioned constant -- never
// recomputed at runtime.

/// Calibration model revision. Bump when the coefficients are refit.
pub const MODEL_VERSION: u32 = 1;

/// Fitted slope of the linear correction.
pub const SLOPE: f64 = 0.98;
/// Fitted intercept of the linear correction.
pub const INTERCEPT: f64 = -4.5;

/// Convert a raw battery telemetry value into a calibrated percentage.
///
/// Applies `SLOPE * raw + INTERCEPT`, clamped to `[0, 100]`.
/// Deterministic, monotonic non-decreasing, no I/O.
pub fn calibrate(raw: f64) -> f64 {
    (SLOPE * raw + INTERCEPT).clamp(0.0, 100.0)
}
