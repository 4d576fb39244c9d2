mod types;

pub use types::{RunningStatistics, DEEP_ABOVE_CM, SHALLOW_BELOW_CM};

/// Incremental aggregator behind [`RunningStatistics`].
///
/// The shallow/deep tallies are kept as integers so the percentages are
/// recomputed from exact counts on each reading instead of being re-derived
/// from the previous percentages.
#[derive(Debug, Clone, Default)]
pub struct StatisticsAggregator {
    current: RunningStatistics,
    shallow_count: u32,
    deep_count: u32,
}

impl StatisticsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statistics(&self) -> RunningStatistics {
        self.current
    }

    /// O(1) update for one raw reading.
    pub fn on_reading(&mut self, depth_cm: f64) -> RunningStatistics {
        let previous_total = self.current.total_compressions;
        let total = previous_total + 1;

        if depth_cm < SHALLOW_BELOW_CM {
            self.shallow_count += 1;
        }
        if depth_cm > DEEP_ABOVE_CM {
            self.deep_count += 1;
        }

        let average_depth =
            (self.current.average_depth * f64::from(previous_total) + depth_cm) / f64::from(total);
        let percentage_shallow = f64::from(self.shallow_count) / f64::from(total) * 100.0;
        let percentage_deep = bounded_deep_percentage(
            percentage_shallow,
            f64::from(self.deep_count) / f64::from(total) * 100.0,
        );

        self.current = RunningStatistics {
            total_compressions: total,
            average_depth,
            percentage_shallow,
            percentage_deep,
        };
        self.current
    }

    /// Rebuilds the statistics from a complete history, discarding whatever
    /// was accumulated before. Produces exactly what the same readings fed
    /// through [`Self::on_reading`] would.
    pub fn on_bulk_load(&mut self, depths: &[f64]) -> RunningStatistics {
        let mut rebuilt = StatisticsAggregator::new();
        for depth in depths {
            rebuilt.on_reading(*depth);
        }
        *self = rebuilt;
        self.current
    }

    pub fn reset(&mut self) {
        *self = StatisticsAggregator::new();
    }
}

// Shallow and deep tallies are disjoint, but two independently rounded
// quotients can still sum past 100 by an ulp.
fn bounded_deep_percentage(shallow: f64, deep: f64) -> f64 {
    let mut deep = deep;
    while deep > 0.0 && shallow + deep > 100.0 {
        deep = f64::from_bits(deep.to_bits() - 1);
    }
    deep
}
