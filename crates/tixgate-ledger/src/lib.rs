//! # tixgate-ledger
//!
//! **Ledger boundary**: everything the settlement core knows about the
//! external ledger.
//!
//! ## Architecture
//!
//! - [`LedgerClient`]: the opaque capability (`submit`, `get_status`,
//!   `get_parsed_effects`, `get_balance`, `get_listing`)
//! - [`Transaction`] / [`Instruction`]: wire model, ed25519 partial signing,
//!   base64 serialization for the client-side signature step
//! - [`ConfirmationTracker`]: bounded polling that keeps "timed out" apart
//!   from "failed"
//! - [`EffectExtractor`]: recovers newly received ticket assets from
//!   confirmed token balance changes
//! - [`SignatureVerifier`]: authenticates wallet-signed requests
//!
//! With the `test-helpers` feature, [`memory::MemoryLedger`] provides an
//! in-process ledger that executes instructions for integration tests.

pub mod auth;
pub mod client;
pub mod confirmation;
pub mod effects;
#[cfg(any(test, feature = "test-helpers"))]
pub mod memory;
pub mod transaction;

pub use auth::{decode_signature, Ed25519Verifier, SignatureVerifier};
pub use client::{LedgerClient, LedgerListing, ParsedEffects, TokenBalance, TxStatus};
pub use confirmation::{Confirmation, ConfirmationTracker};
pub use effects::EffectExtractor;
pub use transaction::{Instruction, Transaction};
