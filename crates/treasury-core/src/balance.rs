//! Balance subscription decoupled from any rendering loop.
//!
//! A [`BalanceWatcher`] polls one token account at a caller-chosen interval
//! and publishes every reading on a `watch` channel. The polling task stops
//! by itself once every receiver has been dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use treasury_chain::Address;

use crate::error::{Result, TreasuryError};
use crate::ledger::{LedgerClient, TokenAmount};

/// The most recent observation of a watched account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BalanceReading {
    /// No reading has completed yet.
    Unknown,
    /// The token account does not exist.
    Missing,
    Balance(TokenAmount),
}

pub struct BalanceWatcher {
    receiver: watch::Receiver<BalanceReading>,
    task: JoinHandle<()>,
}

impl BalanceWatcher {
    /// Start polling `account` every `interval`, which must be non-zero.
    pub fn spawn<L>(ledger: Arc<L>, account: Address, interval: Duration) -> Result<Self>
    where
        L: LedgerClient + ?Sized + 'static,
    {
        if interval.is_zero() {
            return Err(TreasuryError::InvalidConfig(
                "balance poll interval must be positive".into(),
            ));
        }
        let (sender, receiver) = watch::channel(BalanceReading::Unknown);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = sender.closed() => break,
                    _ = ticker.tick() => {}
                }

                match ledger.get_token_account_balance(&account).await {
                    Ok(reading) => {
                        let reading = reading.map_or(BalanceReading::Missing, BalanceReading::Balance);
                        debug!(%account, ?reading, "Balance polled.");
                        sender.send_if_modified(|current| {
                            if *current == reading {
                                false
                            } else {
                                *current = reading;
                                true
                            }
                        });
                    }
                    // Keep the last good reading; the next tick retries.
                    Err(error) => warn!(%account, %error, "Balance poll failed."),
                }
            }
            debug!(%account, "Balance watcher stopped.");
        });

        Ok(Self { receiver, task })
    }

    /// A new receiver observing the same account.
    pub fn subscribe(&self) -> watch::Receiver<BalanceReading> {
        self.receiver.clone()
    }

    /// The latest reading without waiting.
    pub fn current(&self) -> BalanceReading {
        self.receiver.borrow().clone()
    }

    /// Wait for the next changed reading.
    pub async fn changed(&mut self) -> Option<BalanceReading> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Stop polling immediately.
    pub fn stop(self) {
        self.task.abort();
    }
}
