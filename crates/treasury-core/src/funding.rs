//! Liquidity bootstrapping for test networks.
//!
//! Tops up an address's native balance from an ordered list of faucets. This
//! is environment-dependent by nature (faucets are rate limited or disabled)
//! and is only reachable through explicit funding commands, never from the
//! transfer path.

use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{info, instrument, warn};
use treasury_chain::Address;

use crate::config::RetryPolicy;
use crate::error::{Result, TreasuryError};
use crate::ledger::{ConfirmationStatus, Faucet, LedgerClient};
use crate::submit::before_deadline;

/// What [`ensure_funded`] had to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FundingOutcome {
    /// The balance already met the minimum.
    AlreadyFunded { balance: u64 },
    /// A faucet topped the balance up.
    Funded {
        faucet: String,
        signature: String,
        balance: u64,
    },
}

/// Make sure `address` holds at least `minimum` lamports.
///
/// Faucets are tried in order; each is asked for
/// `max(minimum - balance, airdrop_lamports)`. The first faucet whose airdrop
/// confirms and brings the balance to `minimum` ends the search. Running out
/// of faucets is reported as [`TreasuryError::LiquidityBootstrapFailed`];
/// whether that is fatal is the caller's decision. Every call, including the
/// airdrop confirmation polls, gives up at `deadline` with
/// [`TreasuryError::DeadlineExceeded`].
#[instrument(skip_all, err(Debug), fields(%address, minimum))]
pub async fn ensure_funded<L>(
    ledger: &L,
    address: &Address,
    minimum: u64,
    airdrop_lamports: u64,
    faucets: &[Box<dyn Faucet>],
    policy: &RetryPolicy,
    deadline: Instant,
) -> Result<FundingOutcome>
where
    L: LedgerClient + ?Sized,
{
    let mut balance = before_deadline(deadline, ledger.get_balance(address)).await??;
    if balance >= minimum {
        info!(balance, "Native balance already sufficient.");
        return Ok(FundingOutcome::AlreadyFunded { balance });
    }

    for faucet in faucets {
        let request = (minimum - balance).max(airdrop_lamports);
        info!(faucet = faucet.name(), request, balance, "Requesting supplemental funds.");

        let signature = match before_deadline(deadline, faucet.request_funds(address, request))
            .await?
        {
            Ok(signature) => signature,
            Err(error) => {
                warn!(faucet = faucet.name(), %error, "Faucet request failed.");
                continue;
            }
        };

        if !airdrop_confirmed(faucet.as_ref(), &signature, policy, deadline).await? {
            warn!(faucet = faucet.name(), %signature, "Airdrop did not confirm in time.");
            continue;
        }

        balance = before_deadline(deadline, ledger.get_balance(address)).await??;
        if balance >= minimum {
            info!(faucet = faucet.name(), balance, "Funded.");
            return Ok(FundingOutcome::Funded {
                faucet: faucet.name().to_string(),
                signature,
                balance,
            });
        }
        warn!(faucet = faucet.name(), balance, "Still below minimum after airdrop.");
    }

    Err(TreasuryError::LiquidityBootstrapFailed {
        address: *address,
        balance,
        minimum,
    })
}

/// Poll the issuing faucet until the airdrop confirms, fails, or
/// `confirm_timeout` passes. Running into `deadline` is an error.
async fn airdrop_confirmed(
    faucet: &dyn Faucet,
    signature: &str,
    policy: &RetryPolicy,
    deadline: Instant,
) -> Result<bool> {
    let give_up = deadline.min(Instant::now() + policy.confirm_timeout);
    loop {
        match timeout_at(give_up, faucet.confirm_funds(signature)).await {
            Ok(Ok(ConfirmationStatus::Confirmed)) => return Ok(true),
            Ok(Ok(ConfirmationStatus::Failed(reason))) => {
                warn!(%signature, %reason, "Airdrop failed.");
                return Ok(false);
            }
            Ok(Ok(ConfirmationStatus::Pending | ConfirmationStatus::NotFound)) => {}
            Ok(Err(error)) => warn!(%signature, %error, "Airdrop status poll failed."),
            Err(_) => {}
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(TreasuryError::DeadlineExceeded);
        }
        if now >= give_up {
            return Ok(false);
        }
        sleep_until(give_up.min(now + policy.confirm_poll_interval)).await;
    }
}
