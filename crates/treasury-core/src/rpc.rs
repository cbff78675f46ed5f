//! JSON-RPC ledger client.
//!
//! Speaks the Solana JSON-RPC 2.0 dialect over HTTP. Transactions travel as
//! base64; confirmation is read from `getSignatureStatuses`. The same client
//! doubles as a [`Faucet`] on clusters that serve `requestAirdrop`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, trace};
use treasury_chain::Address;

use crate::ledger::{
    AccountRecord, Commitment, ConfirmationStatus, Faucet, FreshnessToken, LedgerClient,
    LedgerError, SendOptions, TokenAmount,
};

/// JSON-RPC error code for a failed preflight simulation.
const SEND_TRANSACTION_PREFLIGHT_FAILURE: i64 = -32002;
/// JSON-RPC error code for invalid params, used for "could not find account".
const INVALID_PARAMS: i64 = -32602;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A ledger client backed by an RPC endpoint.
#[derive(Debug)]
pub struct RpcLedgerClient {
    http: reqwest::Client,
    url: String,
    commitment: Commitment,
    next_id: AtomicU64,
}

impl RpcLedgerClient {
    pub fn new(url: impl Into<String>, commitment: Commitment) -> Result<Self, LedgerError> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            url: url.into(),
            commitment,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        trace!(method, id, "RPC request.");

        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LedgerError::Transport(format!("http {status}: {body}")));
        }

        let envelope: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| LedgerError::Transport(format!("malformed {method} response: {e}")))?;

        match (envelope.result, envelope.error) {
            (_, Some(error)) => Err(classify_rpc_error(error)),
            (Some(result), None) => Ok(result),
            (None, None) => Err(LedgerError::Transport(format!(
                "{method} response has neither result nor error"
            ))),
        }
    }

    fn commitment_config(&self) -> Value {
        json!({ "commitment": self.commitment.as_str() })
    }
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    async fn get_balance(&self, address: &Address) -> Result<u64, LedgerError> {
        let response: WithContext<u64> = self
            .call("getBalance", json!([address.to_string(), self.commitment_config()]))
            .await?;
        Ok(response.value)
    }

    async fn get_account_info(
        &self,
        address: &Address,
    ) -> Result<Option<AccountRecord>, LedgerError> {
        let response: WithContext<Option<RpcAccount>> = self
            .call(
                "getAccountInfo",
                json!([
                    address.to_string(),
                    { "encoding": "base64", "commitment": self.commitment.as_str() }
                ]),
            )
            .await?;

        response.value.map(RpcAccount::into_record).transpose()
    }

    async fn get_token_account_balance(
        &self,
        address: &Address,
    ) -> Result<Option<TokenAmount>, LedgerError> {
        let result: Result<WithContext<RpcTokenAmount>, LedgerError> = self
            .call(
                "getTokenAccountBalance",
                json!([address.to_string(), self.commitment_config()]),
            )
            .await;

        match result {
            Ok(response) => response.value.into_amount().map(Some),
            Err(LedgerError::Rpc { code, message })
                if code == INVALID_PARAMS && message.contains("could not find account") =>
            {
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    async fn get_latest_freshness_token(&self) -> Result<FreshnessToken, LedgerError> {
        let response: WithContext<RpcBlockhash> = self
            .call("getLatestBlockhash", json!([self.commitment_config()]))
            .await?;
        let blockhash = response
            .value
            .blockhash
            .parse::<Address>()
            .map_err(|e| LedgerError::Transport(format!("bad blockhash: {e}")))?;

        Ok(FreshnessToken {
            blockhash: blockhash.to_bytes(),
            last_valid_block_height: response.value.last_valid_block_height,
        })
    }

    async fn get_block_height(&self) -> Result<u64, LedgerError> {
        self.call("getBlockHeight", json!([self.commitment_config()]))
            .await
    }

    async fn send_transaction(
        &self,
        wire: &[u8],
        options: &SendOptions,
    ) -> Result<String, LedgerError> {
        let signature: String = self
            .call(
                "sendTransaction",
                json!([
                    BASE64.encode(wire),
                    {
                        "encoding": "base64",
                        "skipPreflight": options.skip_preflight,
                        "preflightCommitment": options.preflight_commitment.as_str(),
                        // Retries are ours; the node should not rebroadcast on its own.
                        "maxRetries": 0,
                    }
                ]),
            )
            .await?;
        debug!(%signature, "sendTransaction accepted.");
        Ok(signature)
    }

    async fn confirm_transaction(
        &self,
        signature: &str,
        commitment: Commitment,
    ) -> Result<ConfirmationStatus, LedgerError> {
        let response: WithContext<Vec<Option<RpcSignatureStatus>>> = self
            .call(
                "getSignatureStatuses",
                json!([[signature], { "searchTransactionHistory": true }]),
            )
            .await?;

        Ok(match response.value.into_iter().next().flatten() {
            Some(status) => status.at(commitment),
            None => ConfirmationStatus::NotFound,
        })
    }

    async fn get_minimum_balance_for_rent_exemption(
        &self,
        data_len: u64,
    ) -> Result<u64, LedgerError> {
        self.call(
            "getMinimumBalanceForRentExemption",
            json!([data_len, self.commitment_config()]),
        )
        .await
    }
}

#[async_trait]
impl Faucet for RpcLedgerClient {
    fn name(&self) -> &str {
        &self.url
    }

    async fn request_funds(&self, address: &Address, lamports: u64) -> Result<String, LedgerError> {
        self.call(
            "requestAirdrop",
            json!([address.to_string(), lamports, self.commitment_config()]),
        )
        .await
    }

    async fn confirm_funds(&self, signature: &str) -> Result<ConfirmationStatus, LedgerError> {
        self.confirm_transaction(signature, Commitment::Confirmed).await
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcBlockhash {
    blockhash: String,
    last_valid_block_height: u64,
}

#[derive(Debug, Deserialize)]
struct RpcAccount {
    lamports: u64,
    owner: String,
    /// `[base64 payload, "base64"]`
    data: (String, String),
}

impl RpcAccount {
    fn into_record(self) -> Result<AccountRecord, LedgerError> {
        let owner = self
            .owner
            .parse::<Address>()
            .map_err(|e| LedgerError::Transport(format!("bad account owner: {e}")))?;
        let data = BASE64
            .decode(self.data.0.as_bytes())
            .map_err(|e| LedgerError::Transport(format!("bad account data: {e}")))?;

        Ok(AccountRecord {
            lamports: self.lamports,
            owner,
            data_len: data.len(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct RpcTokenAmount {
    amount: String,
    decimals: u8,
}

impl RpcTokenAmount {
    fn into_amount(self) -> Result<TokenAmount, LedgerError> {
        let amount = self
            .amount
            .parse::<u64>()
            .map_err(|e| LedgerError::Transport(format!("bad token amount: {e}")))?;
        Ok(TokenAmount {
            amount,
            decimals: self.decimals,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcSignatureStatus {
    #[serde(default)]
    err: Option<Value>,
    #[serde(default)]
    confirmation_status: Option<Commitment>,
}

impl RpcSignatureStatus {
    fn at(self, wanted: Commitment) -> ConfirmationStatus {
        if let Some(err) = self.err {
            return ConfirmationStatus::Failed(err.to_string());
        }
        match self.confirmation_status {
            Some(reached) if reached >= wanted => ConfirmationStatus::Confirmed,
            _ => ConfirmationStatus::Pending,
        }
    }
}

/// Map a JSON-RPC error object onto the ledger error classes.
fn classify_rpc_error(error: RpcErrorObject) -> LedgerError {
    let RpcErrorObject {
        code,
        message,
        data,
    } = error;

    let detail = data.map(|d| d.to_string()).unwrap_or_default();
    let haystack = format!("{message} {detail}").to_ascii_lowercase();

    if haystack.contains("blockhash not found") || haystack.contains("blockhashnotfound") {
        return LedgerError::BlockhashNotFound;
    }
    if haystack.contains("insufficient funds")
        || haystack.contains("insufficientfunds")
        || haystack.contains("insufficient lamports")
        || haystack.contains("no record of a prior credit")
    {
        return LedgerError::InsufficientFunds(message);
    }
    if code == SEND_TRANSACTION_PREFLIGHT_FAILURE {
        return LedgerError::Simulation(message);
    }
    // Node overload and rate limiting are transient.
    if code == -32005 || code == 429 {
        return LedgerError::Transport(message);
    }

    LedgerError::Rpc { code, message }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rpc_error(code: i64, message: &str, data: Option<Value>) -> RpcErrorObject {
        RpcErrorObject {
            code,
            message: message.into(),
            data,
        }
    }

    #[test]
    fn blockhash_not_found_is_classified() {
        let err = classify_rpc_error(rpc_error(
            -32002,
            "Transaction simulation failed: Blockhash not found",
            None,
        ));
        assert_eq!(err, LedgerError::BlockhashNotFound);
    }

    #[test]
    fn token_insufficient_funds_in_logs_is_classified() {
        let data = json!({
            "err": { "InstructionError": [1, { "Custom": 1 }] },
            "logs": ["Program log: Error: insufficient funds"]
        });
        let err = classify_rpc_error(rpc_error(
            -32002,
            "Transaction simulation failed: Error processing Instruction 1: custom program error: 0x1",
            Some(data),
        ));
        assert!(matches!(err, LedgerError::InsufficientFunds(_)));
    }

    #[test]
    fn fee_payer_without_lamports_is_insufficient_funds() {
        let err = classify_rpc_error(rpc_error(
            -32002,
            "Transaction simulation failed: Attempt to debit an account but found no record of a prior credit.",
            None,
        ));
        assert!(matches!(err, LedgerError::InsufficientFunds(_)));
    }

    #[test]
    fn other_preflight_failures_are_simulation_errors() {
        let err = classify_rpc_error(rpc_error(
            -32002,
            "Transaction simulation failed: Error processing Instruction 0: invalid account data",
            None,
        ));
        assert!(matches!(err, LedgerError::Simulation(_)));
    }

    #[test]
    fn unknown_errors_keep_code() {
        let err = classify_rpc_error(rpc_error(-32601, "Method not found", None));
        assert_eq!(
            err,
            LedgerError::Rpc {
                code: -32601,
                message: "Method not found".into()
            }
        );
    }

    #[test]
    fn signature_status_respects_commitment() {
        let processed = RpcSignatureStatus {
            err: None,
            confirmation_status: Some(Commitment::Processed),
        };
        assert_eq!(processed.at(Commitment::Confirmed), ConfirmationStatus::Pending);

        let finalized = RpcSignatureStatus {
            err: None,
            confirmation_status: Some(Commitment::Finalized),
        };
        assert_eq!(finalized.at(Commitment::Confirmed), ConfirmationStatus::Confirmed);

        let failed = RpcSignatureStatus {
            err: Some(json!({ "InstructionError": [0, "InsufficientFunds"] })),
            confirmation_status: Some(Commitment::Confirmed),
        };
        assert!(matches!(failed.at(Commitment::Confirmed), ConfirmationStatus::Failed(_)));
    }
}
