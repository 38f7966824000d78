use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::energy::EnergyLedger;

use super::sampler::ForegroundSampler;

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Drives one sampling tick per interval until cancelled. Ticks always run
/// to completion; one that overruns `tick_timeout` is logged and the ticker
/// delays the following ones.
pub async fn sampling_loop(
    ledger: EnergyLedger,
    mut sampler: ForegroundSampler,
    cancel_token: CancellationToken,
) {
    let interval = ledger.config().tick_interval;
    let tick_timeout = ledger.config().tick_timeout;

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; skip it so the first settled
    // second is a real one.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let started = Instant::now();
                ledger.run_tick(&mut sampler).await;
                let elapsed = started.elapsed();
                if elapsed > tick_timeout {
                    log_warn!(
                        "sampling tick took {}ms (> {}ms)",
                        elapsed.as_millis(),
                        tick_timeout.as_millis()
                    );
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("sampling loop shutting down");
                break;
            }
        }
    }
}
