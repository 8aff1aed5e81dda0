//! Periodic status broadcast

use std::sync::Arc;
use std::time::Duration;
use stream_console_hub::{Audience, Hub};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Broadcast `message` every `period` until cancelled
pub async fn run_ticker(hub: Arc<Hub>, period: Duration, message: String, cancel: CancellationToken) {
    let mut ticks = interval(period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // first tick fires immediately
    ticks.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticks.tick() => {
                let report = hub.broadcast(message.as_str(), Audience::All).await;
                debug!(?report, "Status tick");
            }
        }
    }
    debug!("Status ticker stopped");
}
