use serde::{Deserialize, Serialize};

/// Depths strictly below this (cm) count as shallow.
pub const SHALLOW_BELOW_CM: f64 = 5.0;
/// Depths strictly above this (cm) count as deep.
pub const DEEP_ABOVE_CM: f64 = 6.0;

/// Cumulative statistics for the active session.
///
/// Every field is zero when no compression has been seen; none of them is ever
/// `NaN`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunningStatistics {
    pub total_compressions: u32,
    pub average_depth: f64,
    pub percentage_shallow: f64,
    pub percentage_deep: f64,
}

impl RunningStatistics {
    pub fn percentage_in_target(&self) -> f64 {
        if self.total_compressions == 0 {
            return 0.0;
        }
        (100.0 - self.percentage_shallow - self.percentage_deep).max(0.0)
    }
}
