//! Error types for the Tixgate settlement engine.
//!
//! All errors use the `TG_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by family:
//! - 1xx: Validation (malformed input, never reaches the ledger)
//! - 2xx: Preconditions (local checks, fail fast)
//! - 3xx: Ledger submission and confirmation
//! - 4xx: Reconciliation (confirmed on-ledger, local follow-up failed)
//! - 9xx: General / internal errors
//!
//! [`TixgateError::kind`] folds the variants into the coarse [`ErrorKind`]
//! taxonomy the boundary layer maps to responses.

use serde::Serialize;
use thiserror::Error;

use crate::{Address, EventId, ListingId, OrderId};

/// Central error enum for all Tixgate operations.
#[derive(Debug, Error)]
pub enum TixgateError {
    // =================================================================
    // Validation Errors (1xx)
    // =================================================================
    /// An address failed base58 / length validation.
    #[error("TG_ERR_100: Invalid address encoding for {field}: {value:?}")]
    InvalidAddressEncoding { field: String, value: String },

    /// A wallet signature could not be normalized to raw bytes.
    #[error("TG_ERR_101: Invalid signature encoding")]
    InvalidSignatureEncoding,

    /// A quantity or amount is out of range.
    #[error("TG_ERR_102: Invalid amount: {reason}")]
    InvalidAmount { reason: String },

    /// The wallet signature did not verify against the claimed address.
    #[error("TG_ERR_103: Signature verification failed for {address}")]
    SignatureRejected { address: Address },

    /// A serialized transaction could not be decoded.
    #[error("TG_ERR_104: Malformed transaction: {reason}")]
    MalformedTransaction { reason: String },

    /// The session is unknown or expired; the user must sign in again.
    #[error("TG_ERR_105: Session expired or unknown")]
    SessionExpired,

    /// The signature does not belong to the transaction prepared for the
    /// record being confirmed.
    #[error("TG_ERR_106: Transaction {signature} was not prepared for {subject}")]
    ForeignTransaction { signature: String, subject: String },

    // =================================================================
    // Precondition Errors (2xx)
    // =================================================================
    /// The listing is not in the `active` state.
    #[error("TG_ERR_200: Listing {listing} is not active ({status})")]
    ListingNotActive { listing: String, status: String },

    /// Buyer and seller are the same party.
    #[error("TG_ERR_201: Self purchase rejected: buyer is the seller")]
    SelfPurchaseRejected,

    /// The buyer's ledger balance does not cover the price.
    #[error("TG_ERR_202: Insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: u64, available: u64 },

    /// The caller does not own the asset or record they act on.
    #[error("TG_ERR_203: Not the owner of {subject}")]
    NotOwner { subject: String },

    /// Another active listing (or an in-flight one) exists for the asset.
    #[error("TG_ERR_204: Asset {asset} already has an active listing")]
    DuplicateActiveListing { asset: Address },

    /// The event does not have enough tickets left.
    #[error("TG_ERR_205: Sold out: requested {requested}, available {available}")]
    SoldOut { requested: u32, available: u32 },

    #[error("TG_ERR_206: Event not found: {0}")]
    EventNotFound(EventId),

    #[error("TG_ERR_207: Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("TG_ERR_208: Listing not found: {0}")]
    ListingNotFound(ListingId),

    #[error("TG_ERR_209: Ticket not found for asset {0}")]
    TicketNotFound(Address),

    /// The order already reached a terminal state other than the one requested.
    #[error("TG_ERR_210: Order {order} is {status}")]
    OrderNotPending { order: OrderId, status: String },

    /// Another request is creating the event's issuance endpoint.
    #[error("TG_ERR_211: Issuance endpoint for {0} is being created, retry shortly")]
    EndpointCreationInProgress(EventId),

    /// A write-once platform setting already holds a different value.
    #[error("TG_ERR_212: Platform setting {key} already set")]
    PlatformConfigConflict { key: String },

    /// The marketplace registry has not been initialized.
    #[error("TG_ERR_213: Marketplace registry not initialized")]
    MarketplaceNotInitialized,

    /// The asset is already recorded locally (duplicate mint reconciliation).
    #[error("TG_ERR_214: Asset {0} already recorded")]
    AssetAlreadyRecorded(Address),

    // =================================================================
    // Ledger Errors (3xx)
    // =================================================================
    /// The ledger rejected the transaction. Terminal; do not resubmit as-is.
    #[error("TG_ERR_300: Ledger rejected transaction {signature}: {reason}")]
    LedgerSubmissionFailed { signature: String, reason: String },

    /// Confirmation polling ran out. The transaction may still land.
    #[error("TG_ERR_301: Confirmation of {signature} timed out after {attempts} polls")]
    ConfirmationTimeout { signature: String, attempts: u32 },

    /// The ledger could not be reached; nothing is known to have happened.
    #[error("TG_ERR_302: Ledger unavailable: {reason}")]
    LedgerUnavailable { reason: String },

    /// The transaction is missing a required signature.
    #[error("TG_ERR_303: Missing signature from {signer}")]
    MissingSignature { signer: Address },

    // =================================================================
    // Reconciliation Errors (4xx)
    // =================================================================
    /// A confirmed transaction produced no asset attributable to the recipient.
    #[error("TG_ERR_400: Transaction {signature} produced no asset for {recipient}")]
    EffectExtractionEmpty { signature: String, recipient: Address },

    /// The local write after a confirmed transaction failed. Carries what is
    /// needed to replay reconciliation.
    #[error(
        "TG_ERR_401: Reconciliation failed for {signature} (buyer {buyer}, assets {assets:?}): {reason}"
    )]
    ReconciliationFailed {
        signature: String,
        buyer: Address,
        assets: Vec<Address>,
        reason: String,
    },

    /// Revenue distribution failed after a confirmed mint.
    #[error("TG_ERR_402: Distribution for {order} failed: {reason}")]
    DistributionFailed { order: OrderId, reason: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    #[error("TG_ERR_900: Internal error: {0}")]
    Internal(String),

    #[error("TG_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Missing or invalid configuration (fail fast at startup).
    #[error("TG_ERR_902: Configuration error: {0}")]
    Configuration(String),
}

/// Coarse error taxonomy exposed to the boundary layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input; never reached the ledger.
    Validation,
    /// A local check failed.
    PreconditionFailed,
    /// The ledger rejected the transaction (or could not be reached).
    LedgerSubmissionFailed,
    /// Outcome unknown; re-check status later, do not resubmit.
    ConfirmationTimeout,
    /// Confirmed but nothing attributable was found; needs reconciliation.
    EffectExtractionEmpty,
    /// Revenue split transfer failed after a successful mint.
    DistributionFailed,
    Internal,
}

impl TixgateError {
    /// Map this error onto the settlement error taxonomy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAddressEncoding { .. }
            | Self::InvalidSignatureEncoding
            | Self::InvalidAmount { .. }
            | Self::SignatureRejected { .. }
            | Self::MalformedTransaction { .. }
            | Self::SessionExpired
            | Self::ForeignTransaction { .. } => ErrorKind::Validation,

            Self::ListingNotActive { .. }
            | Self::SelfPurchaseRejected
            | Self::InsufficientFunds { .. }
            | Self::NotOwner { .. }
            | Self::DuplicateActiveListing { .. }
            | Self::SoldOut { .. }
            | Self::EventNotFound(_)
            | Self::OrderNotFound(_)
            | Self::ListingNotFound(_)
            | Self::TicketNotFound(_)
            | Self::OrderNotPending { .. }
            | Self::EndpointCreationInProgress(_)
            | Self::PlatformConfigConflict { .. }
            | Self::MarketplaceNotInitialized
            | Self::AssetAlreadyRecorded(_) => ErrorKind::PreconditionFailed,

            Self::LedgerSubmissionFailed { .. }
            | Self::LedgerUnavailable { .. }
            | Self::MissingSignature { .. } => ErrorKind::LedgerSubmissionFailed,

            Self::ConfirmationTimeout { .. } => ErrorKind::ConfirmationTimeout,

            Self::EffectExtractionEmpty { .. } | Self::ReconciliationFailed { .. } => {
                ErrorKind::EffectExtractionEmpty
            }

            Self::DistributionFailed { .. } => ErrorKind::DistributionFailed,

            Self::Internal(_) | Self::Serialization(_) | Self::Configuration(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Whether the same request may succeed if retried later.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConfirmationTimeout { .. }
                | Self::LedgerUnavailable { .. }
                | Self::EndpointCreationInProgress(_)
                | Self::DistributionFailed { .. }
        )
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, TixgateError>;

impl From<serde_json::Error> for TixgateError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
