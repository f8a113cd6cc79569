// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Periodic gas price polling.
//!
//! Runs as a background task and publishes the latest gas price into a
//! `watch` channel for whatever surface displays it. Polling failures are
//! logged and the previous value stays published.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::{ChainClient, ChainNetwork};

/// Default poll interval.
pub const DEFAULT_GAS_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Gas price poller that runs as a background tokio task.
pub struct GasPriceMonitor {
    client: Arc<dyn ChainClient>,
    chain: ChainNetwork,
    poll_interval: Duration,
    tx: watch::Sender<Option<u128>>,
}

impl GasPriceMonitor {
    /// Create a monitor and the receiver its updates are published to.
    pub fn new(
        client: Arc<dyn ChainClient>,
        chain: ChainNetwork,
    ) -> (Self, watch::Receiver<Option<u128>>) {
        let (tx, rx) = watch::channel(None);
        (
            Self {
                client,
                chain,
                poll_interval: DEFAULT_GAS_POLL_INTERVAL,
                tx,
            },
            rx,
        )
    }

    pub fn with_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run the polling loop until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(monitor.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(chain = self.chain.as_str(), "Gas price monitor starting");

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            match self.client.gas_price(self.chain).await {
                Ok(price) => {
                    self.tx.send_replace(Some(price));
                }
                Err(e) => {
                    tracing::warn!(chain = self.chain.as_str(), error = %e, "Gas price poll failed, will retry");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {},
                _ = shutdown.cancelled() => break,
            }
        }

        tracing::info!(chain = self.chain.as_str(), "Gas price monitor shutting down");
    }
}
