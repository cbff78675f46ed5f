//! SPL Token and Associated Token Account program instructions.
//!
//! Implements associated token account (ATA) derivation plus the handful of
//! instructions the treasury needs (create ATA, transfer, initialize mint)
//! without pulling in the `spl-token` crates.

use sha2::{Digest, Sha256};

use crate::address::Address;
use crate::error::ChainError;
use crate::transaction::{SolAccountMeta, SolInstruction, SYSTEM_PROGRAM_ID};

// ---------------------------------------------------------------------------
// Well-known program IDs
// ---------------------------------------------------------------------------

/// SPL Token Program ID: `TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA`
pub const TOKEN_PROGRAM_ID: Address = Address::new([
    0x06, 0xdd, 0xf6, 0xe1, 0xd7, 0x65, 0xa1, 0x93, 0xd9, 0xcb, 0xe1, 0x46, 0xce, 0xeb, 0x79, 0xac,
    0x1c, 0xb4, 0x85, 0xed, 0x5f, 0x5b, 0x37, 0x91, 0x3a, 0x8c, 0xf5, 0x85, 0x7e, 0xff, 0x00, 0xa9,
]);

/// Associated Token Account Program ID: `ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL`
pub const ASSOCIATED_TOKEN_PROGRAM_ID: Address = Address::new([
    0x8c, 0x97, 0x25, 0x8f, 0x4e, 0x24, 0x89, 0xf1, 0xbb, 0x3d, 0x10, 0x29, 0x14, 0x8e, 0x0d, 0x83,
    0x0b, 0x5a, 0x13, 0x99, 0xda, 0xff, 0x10, 0x84, 0x04, 0x8e, 0x7b, 0xd8, 0xdb, 0xe9, 0xf8, 0x59,
]);

/// Size in bytes of an SPL Token mint account.
pub const MINT_SIZE: u64 = 82;

/// The string appended to PDA derivation: "ProgramDerivedAddress".
const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

/// SPL Token instruction tags.
const TOKEN_IX_TRANSFER: u8 = 3;
const TOKEN_IX_INITIALIZE_MINT2: u8 = 20;

// ---------------------------------------------------------------------------
// SPL Token Transfer
// ---------------------------------------------------------------------------

/// Build an SPL Token `Transfer` instruction.
///
/// `amount` is in the asset's smallest unit (for a 9-decimal token,
/// `1_000_000_000` is one whole token). The only check performed is
/// `amount > 0`; balances, frozen accounts and ownership are the ledger's
/// business.
///
/// # Wire format
///
/// Tag `3` followed by the u64 LE amount, 9 bytes in total. Accounts are
/// `[source (w), destination (w), authority (s)]`.
pub fn build_spl_transfer(
    source: &Address,
    destination: &Address,
    authority: &Address,
    amount: u64,
) -> Result<SolInstruction, ChainError> {
    if amount == 0 {
        return Err(ChainError::InvalidAmount(
            "transfer amount must be > 0".into(),
        ));
    }

    let mut data = Vec::with_capacity(9);
    data.push(TOKEN_IX_TRANSFER);
    data.extend_from_slice(&amount.to_le_bytes());

    Ok(SolInstruction {
        program_id: TOKEN_PROGRAM_ID,
        accounts: vec![
            SolAccountMeta::writable(*source, false),
            SolAccountMeta::writable(*destination, false),
            SolAccountMeta::readonly(*authority, true),
        ],
        data,
    })
}

// ---------------------------------------------------------------------------
// Associated Token Account creation
// ---------------------------------------------------------------------------

/// Build the Associated Token Account program `Create` instruction.
///
/// `payer` funds the rent of the new account. The instruction carries no
/// data; the program re-derives the ATA from `owner` and `mint` and rejects
/// the transaction if it already exists, so callers check existence first.
pub fn build_create_associated_account(
    payer: &Address,
    owner: &Address,
    mint: &Address,
) -> Result<SolInstruction, ChainError> {
    let associated = derive_associated_token_address(owner, mint)?;

    Ok(SolInstruction {
        program_id: ASSOCIATED_TOKEN_PROGRAM_ID,
        accounts: vec![
            SolAccountMeta::writable(*payer, true),
            SolAccountMeta::writable(associated, false),
            SolAccountMeta::readonly(*owner, false),
            SolAccountMeta::readonly(*mint, false),
            SolAccountMeta::readonly(SYSTEM_PROGRAM_ID, false),
            SolAccountMeta::readonly(TOKEN_PROGRAM_ID, false),
        ],
        data: Vec::new(),
    })
}

// ---------------------------------------------------------------------------
// Mint initialization
// ---------------------------------------------------------------------------

/// Build an SPL Token `InitializeMint2` instruction.
///
/// The mint account must already be allocated with [`MINT_SIZE`] bytes and
/// owned by the token program (see `build_create_account`).
///
/// Data layout: tag `20`, decimals, 32-byte mint authority, then a COption
/// for the freeze authority (`1` + 32 bytes, or a single `0`).
pub fn build_initialize_mint(
    mint: &Address,
    decimals: u8,
    mint_authority: &Address,
    freeze_authority: Option<&Address>,
) -> SolInstruction {
    let mut data = Vec::with_capacity(67);
    data.push(TOKEN_IX_INITIALIZE_MINT2);
    data.push(decimals);
    data.extend_from_slice(mint_authority.as_bytes());
    match freeze_authority {
        Some(freeze) => {
            data.push(1);
            data.extend_from_slice(freeze.as_bytes());
        }
        None => data.push(0),
    }

    SolInstruction {
        program_id: TOKEN_PROGRAM_ID,
        accounts: vec![SolAccountMeta::writable(*mint, false)],
        data,
    }
}

// ---------------------------------------------------------------------------
// Associated Token Account (PDA) derivation
// ---------------------------------------------------------------------------

/// Derive the associated token account address for an owner + mint pair.
///
/// The ATA is a Program Derived Address with seeds
/// `[owner, token_program_id, mint]` under the Associated Token Account
/// program. This must match the network's derivation byte-for-byte, or
/// tokens sent there become unreachable.
pub fn derive_associated_token_address(
    owner: &Address,
    mint: &Address,
) -> Result<Address, ChainError> {
    find_program_address(
        &[owner.as_ref(), TOKEN_PROGRAM_ID.as_ref(), mint.as_ref()],
        &ASSOCIATED_TOKEN_PROGRAM_ID,
    )
    .map(|(address, _bump)| address)
}

/// Find a valid Program Derived Address for the given seeds and program.
///
/// Iterates bump seeds from 255 down to 0, computing
/// `SHA-256(seed_0 || seed_1 || ... || bump || program_id || "ProgramDerivedAddress")`
/// and returning the first result that is NOT a valid Ed25519 point.
fn find_program_address(
    seeds: &[&[u8]],
    program_id: &Address,
) -> Result<(Address, u8), ChainError> {
    for bump in (0u8..=255).rev() {
        if let Some(address) = try_create_program_address(seeds, &[bump], program_id) {
            return Ok((address, bump));
        }
    }

    Err(ChainError::InvalidAddress(
        "could not find valid PDA bump seed".into(),
    ))
}

fn try_create_program_address(
    seeds: &[&[u8]],
    bump_seed: &[u8],
    program_id: &Address,
) -> Option<Address> {
    let mut hasher = Sha256::new();

    for seed in seeds {
        hasher.update(seed);
    }
    hasher.update(bump_seed);
    hasher.update(program_id.as_bytes());
    hasher.update(PDA_MARKER);

    let hash: [u8; 32] = hasher.finalize().into();
    let candidate = Address::new(hash);

    // A valid PDA must NOT be on the Ed25519 curve.
    if candidate.is_on_curve() {
        return None;
    }

    Some(candidate)
}
