//! Client lifecycle: connect, consume events, reconnect with backoff,
//! shut down cooperatively.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use wabridge_proto::{Transport, EVENT_QUEUE_DEPTH};

use crate::events::{self, EventContext, LoopOutcome};

const RECONNECT_MIN: Duration = Duration::from_secs(1);
const RECONNECT_MAX: Duration = Duration::from_secs(30);

/// Drive the protocol client until shutdown. One connection attempt per
/// iteration; reconnects continue indefinitely with doubling, jittered
/// backoff that resets after any healthy connection.
pub async fn run_client(
    transport: Arc<dyn Transport>,
    ctx: EventContext,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut backoff = RECONNECT_MIN;

    loop {
        if *shutdown.borrow() {
            break;
        }

        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        match transport.connect(events_tx).await {
            Ok(()) => {
                match events::run_event_loop(events_rx, &ctx, &mut shutdown).await {
                    LoopOutcome::Shutdown => break,
                    LoopOutcome::Disconnected { was_connected } => {
                        if was_connected {
                            backoff = RECONNECT_MIN;
                        }
                    }
                }
            }
            Err(error) => {
                warn!(%error, "connect attempt failed");
            }
        }

        ctx.health.set_connected(false);
        let delay = jitter(backoff);
        info!(delay_ms = delay.as_millis() as u64, "scheduling reconnect");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }
        backoff = (backoff * 2).min(RECONNECT_MAX);
    }

    transport.disconnect().await;
    ctx.health.set_connected(false);
    info!("client lifecycle stopped");
}

/// Spread reconnect attempts by +/-20%.
fn jitter(base: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(0.8..=1.2);
    base.mul_f64(factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_within_bounds() {
        for _ in 0..200 {
            let delay = jitter(Duration::from_secs(10));
            assert!(delay >= Duration::from_secs(8));
            assert!(delay <= Duration::from_secs(12));
        }
    }

    #[test]
    fn backoff_caps_at_max() {
        let mut backoff = RECONNECT_MIN;
        for _ in 0..10 {
            backoff = (backoff * 2).min(RECONNECT_MAX);
        }
        assert_eq!(backoff, RECONNECT_MAX);
    }
}
