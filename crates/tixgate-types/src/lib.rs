//! # tixgate-types
//!
//! Shared types, errors, and configuration for the **Tixgate** settlement engine.
//!
//! This crate is the leaf dependency of the workspace. It defines:
//!
//! - **Identifiers**: [`UserId`], [`EventId`], [`OrderId`], [`TicketId`], [`ListingId`]
//! - **Ledger addresses**: [`Address`], structurally validated base58 keys
//! - **Records**: [`User`], [`Event`], [`Order`], [`Ticket`], [`Listing`], [`PaymentDistribution`]
//! - **In-flight transactions**: [`PendingSubmission`], recorded before sending
//! - **Listing lifecycle**: [`ListingStatus`] with its monotonic transitions
//! - **Configuration**: [`SettlementConfig`]
//! - **Errors**: [`TixgateError`] with `TG_ERR_` prefix codes and an [`ErrorKind`] taxonomy
//! - **Constants**: system-wide defaults

pub mod address;
pub mod config;
pub mod constants;
pub mod distribution;
pub mod error;
pub mod event;
pub mod ids;
pub mod listing;
pub mod order;
pub mod submission;
pub mod ticket;
pub mod user;

pub use address::*;
pub use config::*;
pub use distribution::*;
pub use error::*;
pub use event::*;
pub use ids::*;
pub use listing::*;
pub use order::*;
pub use submission::*;
pub use ticket::*;
pub use user::*;

// Constants are accessed via `tixgate_types::constants::FOO`
// (not re-exported to avoid name collisions).
