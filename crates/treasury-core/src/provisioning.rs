//! Account provisioning: make sure an owner's associated token account exists.

use tracing::debug;
use treasury_chain::{
    build_create_associated_account, derive_associated_token_address, Address, SolInstruction,
};

use crate::error::Result;
use crate::ledger::LedgerClient;

/// Check whether `owner`'s associated account for `mint` exists.
///
/// Returns `None` if the ledger already holds a record at the derived
/// address, or the instruction that creates it (paid for by `payer`) if not.
/// A missing account is a normal outcome; only transport failures are errors.
/// Nothing is cached, so repeated calls against an unchanged ledger return
/// equal results.
pub async fn ensure_account<L>(
    ledger: &L,
    payer: &Address,
    owner: &Address,
    mint: &Address,
) -> Result<Option<SolInstruction>>
where
    L: LedgerClient + ?Sized,
{
    let associated = derive_associated_token_address(owner, mint)?;

    match ledger.get_account_info(&associated).await? {
        Some(_) => {
            debug!(%owner, %associated, "Associated account exists.");
            Ok(None)
        }
        None => {
            debug!(%owner, %associated, "Associated account missing; will create.");
            Ok(Some(build_create_associated_account(payer, owner, mint)?))
        }
    }
}
