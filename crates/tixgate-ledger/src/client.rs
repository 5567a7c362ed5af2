//! The ledger client capability and the shapes it returns.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tixgate_types::{Address, Result};

use crate::Transaction;

/// Status of a submitted transaction as reported by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TxStatus {
    /// Not yet visible to the node we asked.
    NotFound,
    /// Seen but not yet confirmed.
    Pending,
    Confirmed,
    Finalized,
    /// Landed with an on-ledger error. Terminal.
    Errored { reason: String },
}

impl TxStatus {
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Finalized)
    }
}

/// One token balance line from a transaction's pre or post state.
///
/// Ticket assets are token mints of supply 1 with zero decimals, so the
/// mint address is the asset address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBalance {
    pub mint: Address,
    pub owner: Address,
    /// Raw amount in the token's smallest unit.
    pub amount: u64,
    pub decimals: u8,
}

/// Parsed effects of a landed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedEffects {
    pub signature: String,
    pub error: Option<String>,
    pub pre_token_balances: Vec<TokenBalance>,
    pub post_token_balances: Vec<TokenBalance>,
}

/// On-ledger state of a marketplace listing account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerListing {
    pub address: Address,
    pub registry: Address,
    pub seller: Address,
    pub asset: Address,
    pub price: u64,
    pub active: bool,
    /// Set when the registry requires its authority to co-sign purchases.
    pub authority: Option<Address>,
}

/// Capability the settlement core consumes. Implementations wrap a real
/// ledger RPC client; the core never sees its internals.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Submit a fully signed transaction; returns its signature. Submitting
    /// an already-seen transaction returns the same signature.
    async fn submit(&self, transaction: &Transaction) -> Result<String>;

    async fn get_status(&self, signature: &str) -> Result<TxStatus>;

    /// Effects of a landed transaction, `None` if not (yet) visible.
    async fn get_parsed_effects(&self, signature: &str) -> Result<Option<ParsedEffects>>;

    /// Native balance in base units.
    async fn get_balance(&self, address: &Address) -> Result<u64>;

    async fn get_listing(&self, listing: &Address) -> Result<Option<LedgerListing>>;
}
