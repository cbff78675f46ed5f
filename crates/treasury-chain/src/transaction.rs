//! Legacy transaction wire format and signing.
//!
//! A signed transaction on the wire is a compact-u16 signature count, the
//! 64-byte signatures, then the message. The message starts with a three-byte
//! header (required signatures, read-only signers, read-only non-signers),
//! followed by the account keys, the 32-byte recent blockhash, and the
//! compiled instructions. Each compiled instruction is a program index, its
//! account indices and its data, with compact-u16 length prefixes. Every
//! signature covers the serialized message.

use crate::address::Address;
use crate::error::ChainError;
use crate::keypair::Keypair;

// ---------------------------------------------------------------------------
// Solana System Program
// ---------------------------------------------------------------------------

/// The System Program: 32 zero bytes, `11111111111111111111111111111111`.
pub const SYSTEM_PROGRAM_ID: Address = Address::new([0u8; 32]);

/// System Program `CreateAccount` instruction index (little-endian u32).
const SYSTEM_CREATE_ACCOUNT_IX_INDEX: u32 = 0;

/// Account keys are referenced by u8 index inside compiled instructions.
const MAX_ACCOUNT_KEYS: usize = 256;

// ---------------------------------------------------------------------------
// Compact-u16 encoding
// ---------------------------------------------------------------------------

/// Encode a `u16` value in Solana's compact-u16 format.
///
/// - Values 0..0x7f       -> 1 byte
/// - Values 0x80..0x3fff  -> 2 bytes
/// - Values 0x4000..      -> 3 bytes
pub fn encode_compact_u16(value: u16) -> Vec<u8> {
    let mut val = value as u32;
    let mut out = Vec::with_capacity(3);

    loop {
        let mut byte = (val & 0x7f) as u8;
        val >>= 7;
        if val > 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if val == 0 {
            break;
        }
    }

    out
}

fn compact_len(len: usize, what: &str) -> Result<Vec<u8>, ChainError> {
    let value = u16::try_from(len)
        .map_err(|_| ChainError::SerializationError(format!("too many {what}: {len}")))?;
    Ok(encode_compact_u16(value))
}

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

/// A single account reference in an instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolAccountMeta {
    pub pubkey: Address,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl SolAccountMeta {
    pub fn writable(pubkey: Address, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: true,
        }
    }

    pub fn readonly(pubkey: Address, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: false,
        }
    }
}

/// An instruction before it is compiled into a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolInstruction {
    pub program_id: Address,
    pub accounts: Vec<SolAccountMeta>,
    pub data: Vec<u8>,
}

/// A compiled, unsigned transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolTransaction {
    /// All account keys referenced by this transaction, in canonical order:
    ///   1. writable signers (fee payer first)
    ///   2. read-only signers
    ///   3. writable non-signers
    ///   4. read-only non-signers
    pub account_keys: Vec<Address>,

    /// Number of required signatures (first N accounts are signers).
    pub num_required_signatures: u8,
    /// How many of the signing accounts are read-only.
    pub num_readonly_signed: u8,
    /// How many of the non-signing accounts are read-only.
    pub num_readonly_unsigned: u8,

    /// Recent blockhash: the freshness token this transaction commits to.
    pub recent_blockhash: [u8; 32],

    /// Compiled instructions, in the order they were supplied.
    pub compiled_instructions: Vec<CompiledInstruction>,
}

impl SolTransaction {
    /// The accounts whose signatures the ledger will require.
    pub fn required_signers(&self) -> &[Address] {
        &self.account_keys[..self.num_required_signatures as usize]
    }
}

/// A compiled instruction where account references are replaced by u8 indices
/// into the transaction's `account_keys` array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    pub account_indices: Vec<u8>,
    pub data: Vec<u8>,
}

/// A fully signed transaction ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    /// One signature per required signer, in account-key order.
    pub signatures: Vec<[u8; 64]>,
    /// Complete wire bytes (signatures + message).
    pub wire: Vec<u8>,
}

impl SignedTransaction {
    /// The transaction identifier: Base58 of the fee payer's signature.
    pub fn id(&self) -> String {
        self.signatures
            .first()
            .map(|sig| bs58::encode(sig).into_string())
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// System Program instructions
// ---------------------------------------------------------------------------

/// Build a System Program `CreateAccount` instruction.
///
/// Allocates `space` bytes at `new_account`, funds it with `lamports` from
/// `payer`, and assigns it to `owner_program`. Both `payer` and `new_account`
/// must sign.
pub fn build_create_account(
    payer: &Address,
    new_account: &Address,
    lamports: u64,
    space: u64,
    owner_program: &Address,
) -> SolInstruction {
    // u32 LE index + u64 LE lamports + u64 LE space + 32-byte owner = 52 bytes.
    let mut data = Vec::with_capacity(52);
    data.extend_from_slice(&SYSTEM_CREATE_ACCOUNT_IX_INDEX.to_le_bytes());
    data.extend_from_slice(&lamports.to_le_bytes());
    data.extend_from_slice(&space.to_le_bytes());
    data.extend_from_slice(owner_program.as_bytes());

    SolInstruction {
        program_id: SYSTEM_PROGRAM_ID,
        accounts: vec![
            SolAccountMeta::writable(*payer, true),
            SolAccountMeta::writable(*new_account, true),
        ],
        data,
    }
}

// ---------------------------------------------------------------------------
// Transaction building
// ---------------------------------------------------------------------------

/// Compile a set of instructions into a transaction with a single fee payer.
///
/// Instruction order is preserved exactly. The fee payer is always the first
/// signer and is placed at index 0 in the account keys.
pub fn compile_transaction(
    instructions: &[SolInstruction],
    fee_payer: &Address,
    recent_blockhash: &[u8; 32],
) -> Result<SolTransaction, ChainError> {
    if instructions.is_empty() {
        return Err(ChainError::TransactionBuildError(
            "transaction has no instructions".into(),
        ));
    }

    struct AccountEntry {
        pubkey: Address,
        is_signer: bool,
        is_writable: bool,
    }

    let mut entries: Vec<AccountEntry> = Vec::new();

    let mut upsert = |pubkey: Address, signer: bool, writable: bool| {
        if let Some(entry) = entries.iter_mut().find(|e| e.pubkey == pubkey) {
            entry.is_signer |= signer;
            entry.is_writable |= writable;
        } else {
            entries.push(AccountEntry {
                pubkey,
                is_signer: signer,
                is_writable: writable,
            });
        }
    };

    // Fee payer is always signer + writable.
    upsert(*fee_payer, true, true);

    for ix in instructions {
        for meta in &ix.accounts {
            upsert(meta.pubkey, meta.is_signer, meta.is_writable);
        }
        // Program IDs are non-signer, read-only accounts.
        upsert(ix.program_id, false, false);
    }

    if entries.len() > MAX_ACCOUNT_KEYS {
        return Err(ChainError::TransactionBuildError(format!(
            "too many accounts: {}",
            entries.len()
        )));
    }

    // Stable sort keeps insertion order within a category, so the fee payer
    // (inserted first, writable signer) stays at index 0.
    entries.sort_by_key(|e| match (e.is_signer, e.is_writable) {
        (true, true) => 0u8,
        (true, false) => 1,
        (false, true) => 2,
        (false, false) => 3,
    });

    let num_signers = header_count(entries.iter().filter(|e| e.is_signer).count(), "signers")?;
    let num_readonly_signed = header_count(
        entries.iter().filter(|e| e.is_signer && !e.is_writable).count(),
        "read-only signers",
    )?;
    let num_readonly_unsigned = header_count(
        entries.iter().filter(|e| !e.is_signer && !e.is_writable).count(),
        "read-only accounts",
    )?;

    let account_keys: Vec<Address> = entries.iter().map(|e| e.pubkey).collect();

    let index_of = |key: &Address, what: &str| -> Result<u8, ChainError> {
        account_keys
            .iter()
            .position(|k| k == key)
            .ok_or_else(|| ChainError::TransactionBuildError(format!("{what} not in account keys")))
            .and_then(|i| header_count(i, "account keys"))
    };

    let mut compiled = Vec::with_capacity(instructions.len());
    for ix in instructions {
        let program_id_index = index_of(&ix.program_id, "program_id")?;
        let account_indices = ix
            .accounts
            .iter()
            .map(|meta| index_of(&meta.pubkey, "account"))
            .collect::<Result<Vec<u8>, ChainError>>()?;

        compiled.push(CompiledInstruction {
            program_id_index,
            account_indices,
            data: ix.data.clone(),
        });
    }

    Ok(SolTransaction {
        account_keys,
        num_required_signatures: num_signers,
        num_readonly_signed,
        num_readonly_unsigned,
        recent_blockhash: *recent_blockhash,
        compiled_instructions: compiled,
    })
}

/// Message header counts are single bytes.
fn header_count(count: usize, what: &str) -> Result<u8, ChainError> {
    u8::try_from(count)
        .map_err(|_| ChainError::TransactionBuildError(format!("too many {what}: {count}")))
}

/// Serialize the transaction message (the bytes that get signed).
pub fn serialize_message(tx: &SolTransaction) -> Result<Vec<u8>, ChainError> {
    let mut buf = Vec::with_capacity(256);

    buf.push(tx.num_required_signatures);
    buf.push(tx.num_readonly_signed);
    buf.push(tx.num_readonly_unsigned);

    buf.extend_from_slice(&compact_len(tx.account_keys.len(), "account keys")?);
    for key in &tx.account_keys {
        buf.extend_from_slice(key.as_bytes());
    }

    buf.extend_from_slice(&tx.recent_blockhash);

    buf.extend_from_slice(&compact_len(tx.compiled_instructions.len(), "instructions")?);
    for ix in &tx.compiled_instructions {
        buf.push(ix.program_id_index);

        buf.extend_from_slice(&compact_len(ix.account_indices.len(), "instruction accounts")?);
        buf.extend_from_slice(&ix.account_indices);

        buf.extend_from_slice(&compact_len(ix.data.len(), "instruction data bytes")?);
        buf.extend_from_slice(&ix.data);
    }

    Ok(buf)
}

/// Sign a compiled transaction with every required signer.
///
/// `signers` may be given in any order and may include extra keypairs; each
/// required signer slot is filled by the keypair owning that address.
/// A required signer with no matching keypair is a
/// [`ChainError::MissingSigner`].
pub fn sign_transaction(
    tx: &SolTransaction,
    signers: &[&Keypair],
) -> Result<SignedTransaction, ChainError> {
    let message_bytes = serialize_message(tx)?;

    let signatures = tx
        .required_signers()
        .iter()
        .map(|required| {
            signers
                .iter()
                .find(|kp| kp.address() == *required)
                .map(|kp| kp.sign(&message_bytes))
                .ok_or_else(|| ChainError::MissingSigner(required.to_string()))
        })
        .collect::<Result<Vec<[u8; 64]>, ChainError>>()?;

    let mut wire = Vec::with_capacity(3 + 64 * signatures.len() + message_bytes.len());
    wire.extend_from_slice(&compact_len(signatures.len(), "signatures")?);
    for sig in &signatures {
        wire.extend_from_slice(sig);
    }
    wire.extend_from_slice(&message_bytes);

    Ok(SignedTransaction { signatures, wire })
}
