#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use treasury_chain::{Address, Keypair};
use treasury_core::{
    AccountRecord, Commitment, ConfirmationStatus, Faucet, FreshnessToken, LedgerClient,
    LedgerError, RetryPolicy, SendOptions, TokenAmount,
};

pub const MINT: Address = Address::new([0x4du8; 32]);

pub fn keypair(seed: u8) -> Keypair {
    Keypair::from_bytes(&[seed; 32]).unwrap()
}

/// A retry policy with millisecond timings so tests run quickly.
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_send_attempts: 3,
        send_backoff: Duration::from_millis(5),
        confirm_poll_interval: Duration::from_millis(5),
        confirm_timeout: Duration::from_secs(2),
        stale_token_refreshes: 1,
    }
}

pub fn token(last_valid_block_height: u64, tag: u8) -> FreshnessToken {
    FreshnessToken {
        blockhash: [tag; 32],
        last_valid_block_height,
    }
}

#[derive(Default)]
struct State {
    accounts: HashSet<Address>,
    balances: HashMap<Address, u64>,
    token_balances: HashMap<Address, TokenAmount>,
    tokens: VecDeque<FreshnessToken>,
    send_results: VecDeque<Result<(), LedgerError>>,
    statuses: VecDeque<ConfirmationStatus>,
    /// Block height to jump to after the next successful send.
    height_after_send: Option<u64>,
    sent: Vec<Vec<u8>>,
    events: Vec<String>,
}

/// An in-memory ledger with scriptable responses.
///
/// Unscripted calls succeed: sends are accepted, statuses are `Confirmed`,
/// freshness tokens are valid up to height 1000.
pub struct MockLedger {
    state: Mutex<State>,
    block_height: AtomicU64,
    default_status: Mutex<ConfirmationStatus>,
    confirm_delay: Mutex<Duration>,
    send_delay: Mutex<Duration>,
    lookup_delay: Mutex<Duration>,
    pub rent: u64,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self {
            state: Mutex::new(State::default()),
            block_height: AtomicU64::new(10),
            default_status: Mutex::new(ConfirmationStatus::Confirmed),
            confirm_delay: Mutex::new(Duration::ZERO),
            send_delay: Mutex::new(Duration::ZERO),
            lookup_delay: Mutex::new(Duration::ZERO),
            rent: 1_461_600,
        }
    }
}

impl MockLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_account(&self, address: Address) {
        self.state.lock().unwrap().accounts.insert(address);
    }

    pub fn set_balance(&self, address: Address, lamports: u64) {
        self.state.lock().unwrap().balances.insert(address, lamports);
    }

    pub fn credit(&self, address: Address, lamports: u64) {
        *self
            .state
            .lock()
            .unwrap()
            .balances
            .entry(address)
            .or_default() += lamports;
    }

    pub fn set_token_balance(&self, account: Address, amount: u64, decimals: u8) {
        let mut state = self.state.lock().unwrap();
        state.accounts.insert(account);
        state
            .token_balances
            .insert(account, TokenAmount { amount, decimals });
    }

    pub fn push_token(&self, token: FreshnessToken) {
        self.state.lock().unwrap().tokens.push_back(token);
    }

    pub fn push_send_result(&self, result: Result<(), LedgerError>) {
        self.state.lock().unwrap().send_results.push_back(result);
    }

    pub fn push_status(&self, status: ConfirmationStatus) {
        self.state.lock().unwrap().statuses.push_back(status);
    }

    /// Status reported once the scripted statuses run out.
    pub fn set_default_status(&self, status: ConfirmationStatus) {
        *self.default_status.lock().unwrap() = status;
    }

    pub fn set_block_height(&self, height: u64) {
        self.block_height.store(height, Ordering::SeqCst);
    }

    pub fn jump_height_after_send(&self, height: u64) {
        self.state.lock().unwrap().height_after_send = Some(height);
    }

    pub fn set_confirm_delay(&self, delay: Duration) {
        *self.confirm_delay.lock().unwrap() = delay;
    }

    /// Accepted sends return only after `delay`.
    pub fn set_send_delay(&self, delay: Duration) {
        *self.send_delay.lock().unwrap() = delay;
    }

    /// Account lookups answer only after `delay`.
    pub fn set_lookup_delay(&self, delay: Duration) {
        *self.lookup_delay.lock().unwrap() = delay;
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn events(&self) -> Vec<String> {
        self.state.lock().unwrap().events.clone()
    }

    fn record(&self, event: impl Into<String>) {
        self.state.lock().unwrap().events.push(event.into());
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// The first signature of a legacy transaction with fewer than 128
/// signatures, Base58-encoded.
pub fn wire_signature(wire: &[u8]) -> String {
    bs58::encode(&wire[1..65]).into_string()
}

/// Number of instructions in a legacy transaction's message.
pub fn wire_instruction_count(wire: &[u8]) -> usize {
    let signatures = wire[0] as usize;
    let message = &wire[1 + 64 * signatures..];
    let accounts = message[3] as usize;
    // header (3) + account count (1) + keys + blockhash (32)
    message[4 + 32 * accounts + 32] as usize
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn get_balance(&self, address: &Address) -> Result<u64, LedgerError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .balances
            .get(address)
            .copied()
            .unwrap_or_default())
    }

    async fn get_account_info(
        &self,
        address: &Address,
    ) -> Result<Option<AccountRecord>, LedgerError> {
        self.record(format!("account:{address}"));
        let delay = *self.lookup_delay.lock().unwrap();
        pause(delay).await;
        let state = self.state.lock().unwrap();
        Ok(state.accounts.contains(address).then(|| AccountRecord {
            lamports: 2_039_280,
            owner: treasury_chain::TOKEN_PROGRAM_ID,
            data_len: 165,
        }))
    }

    async fn get_token_account_balance(
        &self,
        address: &Address,
    ) -> Result<Option<TokenAmount>, LedgerError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .token_balances
            .get(address)
            .copied())
    }

    async fn get_latest_freshness_token(&self) -> Result<FreshnessToken, LedgerError> {
        self.record("token");
        Ok(self
            .state
            .lock()
            .unwrap()
            .tokens
            .pop_front()
            .unwrap_or_else(|| token(1000, 0xbb)))
    }

    async fn get_block_height(&self) -> Result<u64, LedgerError> {
        Ok(self.block_height.load(Ordering::SeqCst))
    }

    async fn send_transaction(
        &self,
        wire: &[u8],
        _options: &SendOptions,
    ) -> Result<String, LedgerError> {
        let signature = wire_signature(wire);
        {
            let mut state = self.state.lock().unwrap();
            state.events.push(format!("send:{signature}"));
            state.send_results.pop_front().unwrap_or(Ok(()))?;

            state.sent.push(wire.to_vec());
            if let Some(height) = state.height_after_send.take() {
                self.block_height.store(height, Ordering::SeqCst);
            }
        }
        // Delivered; only the reply is slow.
        let delay = *self.send_delay.lock().unwrap();
        pause(delay).await;
        Ok(signature)
    }

    async fn confirm_transaction(
        &self,
        signature: &str,
        _commitment: Commitment,
    ) -> Result<ConfirmationStatus, LedgerError> {
        let delay = *self.confirm_delay.lock().unwrap();
        pause(delay).await;
        let scripted = self.state.lock().unwrap().statuses.pop_front();
        let status = scripted.unwrap_or_else(|| self.default_status.lock().unwrap().clone());
        if status == ConfirmationStatus::Confirmed {
            self.record(format!("confirmed:{signature}"));
        }
        Ok(status)
    }

    async fn get_minimum_balance_for_rent_exemption(
        &self,
        _data_len: u64,
    ) -> Result<u64, LedgerError> {
        Ok(self.rent)
    }
}

/// A faucet that either credits the mock ledger or fails.
///
/// Funding signatures report `status` when confirmed through the faucet.
pub struct MockFaucet {
    pub name: String,
    ledger: Option<Arc<MockLedger>>,
    status: ConfirmationStatus,
    pub requests: Mutex<Vec<u64>>,
    pub confirmations: Mutex<Vec<String>>,
}

impl MockFaucet {
    pub fn working(name: &str, ledger: Arc<MockLedger>) -> Self {
        Self {
            name: name.into(),
            ledger: Some(ledger),
            status: ConfirmationStatus::Confirmed,
            requests: Mutex::new(Vec::new()),
            confirmations: Mutex::new(Vec::new()),
        }
    }

    pub fn broken(name: &str) -> Self {
        Self {
            ledger: None,
            ..Self::working(name, MockLedger::new())
        }
    }

    pub fn with_status(mut self, status: ConfirmationStatus) -> Self {
        self.status = status;
        self
    }
}

#[async_trait]
impl Faucet for MockFaucet {
    fn name(&self) -> &str {
        &self.name
    }

    async fn request_funds(&self, address: &Address, lamports: u64) -> Result<String, LedgerError> {
        self.requests.lock().unwrap().push(lamports);
        match &self.ledger {
            Some(ledger) => {
                ledger.credit(*address, lamports);
                Ok(format!("airdrop-{}", self.name))
            }
            None => Err(LedgerError::Transport("429 Too Many Requests".into())),
        }
    }

    async fn confirm_funds(&self, signature: &str) -> Result<ConfirmationStatus, LedgerError> {
        self.confirmations.lock().unwrap().push(signature.to_string());
        Ok(self.status.clone())
    }
}
