//! # tixgate-settlement
//!
//! **Settlement core**: turns ledger outcomes into local records exactly once.
//!
//! ## Architecture
//!
//! [`SettlementEngine`] exposes two-phase operations. Phase one builds a
//! transaction; phase two takes its signature, waits for the ledger, and
//! reconciles:
//!
//! | Flow | Prepare | Confirm |
//! |------|---------|---------|
//! | Primary sale | `prepare_mint` | `confirm_mint` (+ `retry_distribution`) |
//! | Listing | `create_listing` | `resume_listing` after a timeout |
//! | Cancellation | `cancel_listing` | `confirm_cancel_listing` after a timeout |
//! | Resale | `prepare_buy` | `confirm_buy` |
//!
//! Supporting pieces:
//! - [`key_derivation`]: custodial keypairs rebuilt from wallet signatures
//! - [`builder::TransactionBuilder`]: mint and purchase transactions, lazy
//!   issuance endpoints
//! - [`revenue`]: organizer/platform split and payouts
//! - [`store::SettlementLedger`]: local tables with unique indexes
//! - [`session::SessionCache`], [`config::EngineSecrets`], [`telemetry`]

pub mod builder;
pub mod config;
pub mod engine;
pub mod key_derivation;
pub mod marketplace;
pub mod primary;
pub mod revenue;
pub mod session;
pub mod store;
pub mod telemetry;

pub use builder::{PreparedMint, PreparedPurchase, PurchaseRequest, TransactionBuilder};
pub use config::{EngineSecrets, PlatformAuthority};
pub use engine::{AuthenticatedUser, ListingView, SettlementEngine, SignedRequest};
pub use key_derivation::{derive_custodial_keypair, CustodialKeypair, KeySalt};
pub use marketplace::PurchaseSettlement;
pub use primary::{DistributionOutcome, MintSettlement};
pub use revenue::{split, Payout, RevenueSplitter};
pub use session::{Session, SessionCache, SessionId};
pub use store::SettlementLedger;
