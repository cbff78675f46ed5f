//! Transaction assembly, submission and confirmation.
//!
//! One call to [`submit`] fetches a freshness token, compiles the instructions
//! in the given order, signs with every signer, sends with bounded retries and
//! then polls until the requested commitment is reached. The caller's
//! deadline bounds the whole sequence.

use std::future::Future;

use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, info, instrument, warn};
use treasury_chain::{
    compile_transaction, sign_transaction, Address, Keypair, SignedTransaction, SolInstruction,
};

use crate::config::RetryPolicy;
use crate::error::{Result, TreasuryError};
use crate::ledger::{
    Commitment, ConfirmationStatus, FreshnessToken, LedgerClient, LedgerError, SendOptions,
};

/// Build, sign, send and confirm one transaction.
///
/// Errors:
/// - [`TreasuryError::StaleFreshnessToken`]: the token expired and the ledger
///   has no record of the signature. Rebuild the whole transaction with a
///   new token.
/// - [`TreasuryError::DeadlineExceeded`]: nothing was sent.
/// - [`TreasuryError::ConfirmationTimeout`]: something was sent and its fate
///   is unknown.
/// - [`TreasuryError::InsufficientFunds`], [`TreasuryError::SimulationFailure`],
///   [`TreasuryError::TransactionFailed`]: rejected by ledger rules, never
///   retried here.
#[instrument(skip_all, err(Debug), fields(fee_payer = %fee_payer, instructions = instructions.len()))]
pub async fn submit<L>(
    ledger: &L,
    instructions: &[SolInstruction],
    signers: &[&Keypair],
    fee_payer: &Address,
    commitment: Commitment,
    policy: &RetryPolicy,
    deadline: Instant,
) -> Result<String>
where
    L: LedgerClient + ?Sized,
{
    if Instant::now() >= deadline {
        return Err(TreasuryError::DeadlineExceeded);
    }
    let token = before_deadline(deadline, ledger.get_latest_freshness_token())
        .await?
        .map_err(TreasuryError::from)?;

    let tx = compile_transaction(instructions, fee_payer, &token.blockhash)?;
    let signed = sign_transaction(&tx, signers)?;
    debug!(
        signature = %signed.id(),
        last_valid_block_height = token.last_valid_block_height,
        "Transaction signed."
    );

    let signature = send_with_retries(ledger, &signed, &token, commitment, policy, deadline).await?;
    info!(%signature, "Transaction submitted; awaiting confirmation.");

    await_confirmation(ledger, &signature, &token, commitment, policy, deadline).await?;
    info!(%signature, %commitment, "Transaction confirmed.");

    Ok(signature)
}

/// Send the signed bytes, retrying transport failures with a fixed delay.
///
/// Re-sending identical signed bytes cannot double-spend: the ledger
/// deduplicates by signature.
async fn send_with_retries<L>(
    ledger: &L,
    signed: &SignedTransaction,
    token: &FreshnessToken,
    commitment: Commitment,
    policy: &RetryPolicy,
    deadline: Instant,
) -> Result<String>
where
    L: LedgerClient + ?Sized,
{
    let options = SendOptions {
        skip_preflight: false,
        preflight_commitment: commitment,
    };
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        if Instant::now() >= deadline {
            return Err(deadline_error(attempt, signed));
        }

        let height = match timeout_at(deadline, ledger.get_block_height()).await {
            Ok(height) => height,
            Err(_) => return Err(deadline_error(attempt, signed)),
        };

        let outcome = match height {
            Ok(height) if !token.is_valid_at(height) => {
                debug!(
                    height,
                    last_valid_block_height = token.last_valid_block_height,
                    "Freshness token expired before send."
                );
                Err(LedgerError::BlockhashNotFound)
            }
            Ok(_) => {
                let send = ledger.send_transaction(&signed.wire, &options);
                match timeout_at(deadline, send).await {
                    Ok(outcome) => outcome,
                    // The bytes may already be on their way to the ledger.
                    Err(_) => {
                        return Err(TreasuryError::ConfirmationTimeout {
                            signature: signed.id(),
                        })
                    }
                }
            }
            Err(error) => Err(error),
        };

        match outcome {
            Ok(signature) => return Ok(signature),
            Err(LedgerError::BlockhashNotFound) if attempt > 1 => {
                // An earlier attempt may have landed; let its status decide.
                debug!(attempt, "Token expired after an ambiguous send.");
                return Ok(signed.id());
            }
            Err(error) if error.is_transport() && attempt < policy.max_send_attempts => {
                warn!(
                    attempt,
                    max_attempts = policy.max_send_attempts,
                    %error,
                    "Send failed. Retrying in {:?}",
                    policy.send_backoff
                );
                sleep_until(deadline.min(Instant::now() + policy.send_backoff)).await;
            }
            Err(error) => return Err(error.into()),
        }
    }
}

/// Poll the signature until it reaches `commitment`.
async fn await_confirmation<L>(
    ledger: &L,
    signature: &str,
    token: &FreshnessToken,
    commitment: Commitment,
    policy: &RetryPolicy,
    deadline: Instant,
) -> Result<()>
where
    L: LedgerClient + ?Sized,
{
    let confirm_by = deadline.min(Instant::now() + policy.confirm_timeout);
    let timed_out = || TreasuryError::ConfirmationTimeout {
        signature: signature.to_string(),
    };

    loop {
        match timeout_at(confirm_by, ledger.confirm_transaction(signature, commitment)).await {
            Err(_) => return Err(timed_out()),
            Ok(Ok(ConfirmationStatus::Confirmed)) => return Ok(()),
            Ok(Ok(ConfirmationStatus::Failed(reason))) => {
                return Err(classify_failure(signature, reason))
            }
            Ok(Ok(ConfirmationStatus::Pending)) => {
                debug!(%signature, "Landed below the requested commitment.");
            }
            Ok(Ok(ConfirmationStatus::NotFound)) => {
                if token_expired(ledger, signature, token, commitment, confirm_by).await {
                    warn!(%signature, "Freshness token expired before the transaction landed.");
                    return Err(TreasuryError::StaleFreshnessToken);
                }
            }
            Ok(Err(error)) => {
                warn!(%signature, %error, "Confirmation poll failed.");
            }
        }

        if Instant::now() >= confirm_by {
            return Err(timed_out());
        }
        sleep_until(confirm_by.min(Instant::now() + policy.confirm_poll_interval)).await;
    }
}

/// True once the ledger is past the token's last valid height and the
/// signature is still unknown, so it can never land.
async fn token_expired<L>(
    ledger: &L,
    signature: &str,
    token: &FreshnessToken,
    commitment: Commitment,
    confirm_by: Instant,
) -> bool
where
    L: LedgerClient + ?Sized,
{
    match timeout_at(confirm_by, ledger.get_block_height()).await {
        Ok(Ok(height)) if !token.is_valid_at(height) => {}
        _ => return false,
    }
    // The status read before the height may predate a late landing.
    matches!(
        timeout_at(confirm_by, ledger.confirm_transaction(signature, commitment)).await,
        Ok(Ok(ConfirmationStatus::NotFound))
    )
}

/// Once any attempt may have reached the ledger, an expired deadline leaves
/// the transaction's fate unknown.
fn deadline_error(attempt: u32, signed: &SignedTransaction) -> TreasuryError {
    if attempt > 1 {
        TreasuryError::ConfirmationTimeout {
            signature: signed.id(),
        }
    } else {
        TreasuryError::DeadlineExceeded
    }
}

fn classify_failure(signature: &str, reason: String) -> TreasuryError {
    if reason.to_ascii_lowercase().contains("insufficient") {
        TreasuryError::InsufficientFunds(reason)
    } else {
        TreasuryError::TransactionFailed {
            signature: signature.to_string(),
            reason,
        }
    }
}

/// Run `fut` unless `deadline` passes first.
pub(crate) async fn before_deadline<F: Future>(deadline: Instant, fut: F) -> Result<F::Output> {
    timeout_at(deadline, fut)
        .await
        .map_err(|_| TreasuryError::DeadlineExceeded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_funds_failures_are_classified() {
        let err = classify_failure("sig", "InsufficientFundsForFee".into());
        assert!(matches!(err, TreasuryError::InsufficientFunds(_)));

        let err = classify_failure("sig", "Error processing Instruction 1: insufficient funds".into());
        assert!(matches!(err, TreasuryError::InsufficientFunds(_)));
    }

    #[test]
    fn other_failures_keep_the_signature() {
        let err = classify_failure("5sig", "AccountInUse".into());
        match err {
            TreasuryError::TransactionFailed { signature, reason } => {
                assert_eq!(signature, "5sig");
                assert_eq!(reason, "AccountInUse");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn before_deadline_reports_elapsed() {
        let deadline = Instant::now();
        let result = before_deadline(deadline, futures::future::pending::<()>()).await;
        assert!(matches!(result, Err(TreasuryError::DeadlineExceeded)));
    }
}
