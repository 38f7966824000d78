use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::energy::EnergyLedger;

use super::{loop_worker::sampling_loop, sampler::ForegroundSampler};

/// Owns the sampling task. Starting twice is a no-op; stopping waits for the
/// in-flight tick to finish.
pub struct SamplerController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl SamplerController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    pub fn start(&mut self, ledger: EnergyLedger, sampler: ForegroundSampler) {
        if self.is_running() {
            return;
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(sampling_loop(ledger, sampler, cancel_token.clone()));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("sampling loop task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}

impl Default for SamplerController {
    fn default() -> Self {
        Self::new()
    }
}
