//! Meter samples and the cumulative energy register

use chrono::{DateTime, Utc};

/// The only measurand the engine records; also the OCPP 1.6 default when a
/// sample omits its measurand.
pub const ENERGY_ACTIVE_IMPORT_REGISTER: &str = "Energy.Active.Import.Register";

/// A stored energy sample.
#[derive(Debug, Clone, PartialEq)]
pub struct MeterValue {
    pub transaction_id: i32,
    pub timestamp: DateTime<Utc>,
    pub measurand: String,
    pub value_wh: f64,
}

/// Outcome of offering a register reading as the charger's new total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnergyUpdate {
    Accepted { total_wh: i64 },
    /// Reading was below the stored total and left it untouched
    Ignored { stored_wh: i64 },
    /// Reading is not a representable register value; nothing was written
    OutOfRange,
    UnknownCharger,
}

/// Whole Wh of a register reading, or `None` when it is negative, not finite
/// or too large for the stored counter.
pub fn register_wh(value_wh: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, which is itself out of range
    if !value_wh.is_finite() || value_wh < 0.0 || value_wh >= i64::MAX as f64 {
        return None;
    }
    Some(value_wh as i64)
}

/// Monotonic overwrite: a reading replaces the total unless it is lower.
pub fn accepts_reading(stored_wh: Option<i64>, reading_wh: i64) -> bool {
    stored_wh.map_or(true, |stored| reading_wh >= stored)
}
