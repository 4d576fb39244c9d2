use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::controller::SessionController;

/// Probes backend health every `period`, the first probe immediately.
pub(crate) async fn health_loop(
    controller: SessionController,
    period: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            _ = ticker.tick() => {
                tokio::select! {
                    _ = cancel_token.cancelled() => break,
                    _ = controller.check_health() => {}
                }
            }
        }
    }
}
