//! The treasury workflow.
//!
//! [`Treasury`] ties provisioning, transfer construction and submission
//! together behind per-authority serialization. A stale freshness token
//! rebuilds the whole transaction, provisioning checks included, because the
//! ledger may have changed in between.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, instrument, warn};
use treasury_chain::{
    build_create_account, build_initialize_mint, build_spl_transfer,
    derive_associated_token_address, Address, Keypair, SolInstruction, MINT_SIZE,
    TOKEN_PROGRAM_ID,
};

use crate::balance::BalanceWatcher;
use crate::config::{Config, RetryPolicy};
use crate::error::{Result, TreasuryError};
use crate::funding::{ensure_funded, FundingOutcome};
use crate::ledger::{Commitment, Faucet, LedgerClient, TokenAmount};
use crate::lock::AuthorityLocks;
use crate::provisioning::ensure_account;
use crate::submit::{before_deadline, submit};

/// An ordered, unsigned transfer: any sub-account creations followed by the
/// transfer itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPlan {
    pub source_account: Address,
    pub destination_account: Address,
    pub instructions: Vec<SolInstruction>,
}

impl TransferPlan {
    /// Number of sub-accounts this plan creates.
    pub fn creations(&self) -> usize {
        self.instructions.len().saturating_sub(1)
    }
}

pub struct Treasury<L: ?Sized> {
    ledger: Arc<L>,
    authority: Keypair,
    mint: Option<Address>,
    commitment: Commitment,
    policy: RetryPolicy,
    min_fee_balance: Option<u64>,
    locks: AuthorityLocks,
}

impl<L> Treasury<L>
where
    L: LedgerClient + ?Sized,
{
    pub fn new(ledger: Arc<L>, authority: Keypair, policy: RetryPolicy) -> Self {
        Self {
            ledger,
            authority,
            mint: None,
            commitment: Commitment::default(),
            policy,
            min_fee_balance: None,
            locks: AuthorityLocks::new(),
        }
    }

    pub fn from_config(ledger: Arc<L>, authority: Keypair, config: &Config) -> Self {
        let mut treasury = Self::new(ledger, authority, config.retry)
            .with_commitment(config.network.commitment);
        treasury.mint = config.treasury.mint;
        treasury.min_fee_balance = config.treasury.min_fee_balance;
        treasury
    }

    pub fn with_mint(mut self, mint: Address) -> Self {
        self.mint = Some(mint);
        self
    }

    pub fn with_commitment(mut self, commitment: Commitment) -> Self {
        self.commitment = commitment;
        self
    }

    /// Refuse transfers while the fee payer holds fewer than `lamports`.
    pub fn with_min_fee_balance(mut self, lamports: u64) -> Self {
        self.min_fee_balance = Some(lamports);
        self
    }

    pub fn authority(&self) -> &Keypair {
        &self.authority
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    pub fn mint(&self) -> Result<Address> {
        self.mint
            .ok_or_else(|| TreasuryError::InvalidConfig("no mint configured".into()))
    }

    /// The sub-account `owner` holds for the configured mint.
    pub fn sub_account(&self, owner: &Address) -> Result<Address> {
        Ok(derive_associated_token_address(owner, &self.mint()?)?)
    }

    /// Build the instructions for moving `amount` from `authority` to
    /// `destination_owner`, creating missing sub-accounts first.
    ///
    /// The source account is checked before the destination; the fee payer
    /// (the authority) pays for any creation.
    pub async fn prepare_transfer(
        &self,
        authority: &Address,
        destination_owner: &Address,
        amount: u64,
    ) -> Result<TransferPlan> {
        if amount == 0 {
            return Err(TreasuryError::InvalidAmount("amount must be positive".into()));
        }
        let mint = self.mint()?;
        let ledger = self.ledger.as_ref();

        let source_account = derive_associated_token_address(authority, &mint)?;
        let destination_account = derive_associated_token_address(destination_owner, &mint)?;

        let mut instructions = Vec::with_capacity(3);
        if let Some(create) = ensure_account(ledger, authority, authority, &mint).await? {
            instructions.push(create);
        }
        // A self-transfer shares one account; creating it twice would fail.
        if destination_account != source_account {
            if let Some(create) =
                ensure_account(ledger, authority, destination_owner, &mint).await?
            {
                instructions.push(create);
            }
        }
        instructions.push(build_spl_transfer(
            &source_account,
            &destination_account,
            authority,
            amount,
        )?);

        Ok(TransferPlan {
            source_account,
            destination_account,
            instructions,
        })
    }

    /// Transfer `amount` base units from `authority` to `destination_owner`.
    ///
    /// Requests for the same authority run one at a time. Returns the
    /// confirmed transaction signature.
    #[instrument(skip_all, err(Debug), fields(authority = %authority.address(), %destination_owner, amount))]
    pub async fn transfer(
        &self,
        authority: &Keypair,
        destination_owner: &Address,
        amount: u64,
        deadline: Instant,
    ) -> Result<String> {
        let payer = authority.address();
        let _claim = before_deadline(deadline, self.locks.acquire(&payer)).await?;

        before_deadline(deadline, self.check_fee_balance(&payer)).await??;

        let mut refreshes = 0;
        loop {
            let plan = before_deadline(
                deadline,
                self.prepare_transfer(&payer, destination_owner, amount),
            )
            .await??;
            info!(
                creations = plan.creations(),
                destination_account = %plan.destination_account,
                "Transfer prepared."
            );

            match submit(
                self.ledger.as_ref(),
                &plan.instructions,
                &[authority],
                &payer,
                self.commitment,
                &self.policy,
                deadline,
            )
            .await
            {
                Err(TreasuryError::StaleFreshnessToken)
                    if refreshes < self.policy.stale_token_refreshes =>
                {
                    refreshes += 1;
                    warn!(refreshes, "Freshness token went stale; rebuilding transfer.");
                }
                outcome => return outcome,
            }
        }
    }

    /// Pay `recipient` from the treasury's own authority.
    pub async fn payout(&self, recipient: &Address, amount: u64, deadline: Instant) -> Result<String> {
        self.transfer(&self.authority, recipient, amount, deadline).await
    }

    /// Create `owner`'s sub-account if it is missing, paid by the treasury.
    ///
    /// Returns `None` when the account already exists.
    #[instrument(skip_all, err(Debug), fields(%owner))]
    pub async fn init_account(&self, owner: &Address, deadline: Instant) -> Result<Option<String>> {
        let payer = self.authority.address();
        let mint = self.mint()?;
        let _claim = before_deadline(deadline, self.locks.acquire(&payer)).await?;

        let lookup = ensure_account(self.ledger.as_ref(), &payer, owner, &mint);
        let Some(create) = before_deadline(deadline, lookup).await?? else {
            info!("Sub-account already exists.");
            return Ok(None);
        };

        let signature = submit(
            self.ledger.as_ref(),
            &[create],
            &[&self.authority],
            &payer,
            self.commitment,
            &self.policy,
            deadline,
        )
        .await?;
        Ok(Some(signature))
    }

    /// Create a new mint with `decimals`, the treasury authority as both mint
    /// and freeze authority. Returns the mint address and the signature.
    #[instrument(skip_all, err(Debug), fields(decimals))]
    pub async fn create_mint(&self, decimals: u8, deadline: Instant) -> Result<(Address, String)> {
        let payer = self.authority.address();
        let mint = Keypair::generate();
        let mint_address = mint.address();
        let _claim = before_deadline(deadline, self.locks.acquire(&payer)).await?;

        let rent = before_deadline(
            deadline,
            self.ledger.get_minimum_balance_for_rent_exemption(MINT_SIZE),
        )
        .await??;
        let instructions = [
            build_create_account(&payer, &mint_address, rent, MINT_SIZE, &TOKEN_PROGRAM_ID),
            build_initialize_mint(&mint_address, decimals, &payer, Some(&payer)),
        ];

        let signature = submit(
            self.ledger.as_ref(),
            &instructions,
            &[&self.authority, &mint],
            &payer,
            self.commitment,
            &self.policy,
            deadline,
        )
        .await?;
        info!(mint = %mint_address, %signature, "Mint created.");
        Ok((mint_address, signature))
    }

    /// Token balance of `owner`'s sub-account, or `None` if it does not exist.
    pub async fn token_balance(&self, owner: &Address) -> Result<Option<TokenAmount>> {
        let account = self.sub_account(owner)?;
        Ok(self.ledger.get_token_account_balance(&account).await?)
    }

    /// Top up the treasury authority's native balance from `faucets`.
    pub async fn fund_native(
        &self,
        minimum: u64,
        airdrop_lamports: u64,
        faucets: &[Box<dyn Faucet>],
        deadline: Instant,
    ) -> Result<FundingOutcome> {
        ensure_funded(
            self.ledger.as_ref(),
            &self.authority.address(),
            minimum,
            airdrop_lamports,
            faucets,
            &self.policy,
            deadline,
        )
        .await
    }

    async fn check_fee_balance(&self, payer: &Address) -> Result<()> {
        let Some(minimum) = self.min_fee_balance else {
            return Ok(());
        };
        let balance = self.ledger.get_balance(payer).await?;
        if balance < minimum {
            return Err(TreasuryError::InsufficientFunds(format!(
                "fee payer {payer} holds {balance} lamports, needs at least {minimum}"
            )));
        }
        Ok(())
    }
}

impl<L> Treasury<L>
where
    L: LedgerClient + ?Sized + 'static,
{
    /// Poll `owner`'s sub-account balance every `interval`.
    pub fn watch_balance(&self, owner: &Address, interval: Duration) -> Result<BalanceWatcher> {
        let account = self.sub_account(owner)?;
        BalanceWatcher::spawn(self.ledger.clone(), account, interval)
    }
}

/// A deadline `timeout` from now.
pub fn deadline_in(timeout: Duration) -> Instant {
    Instant::now() + timeout
}
