//! Confirmation tracking for submitted transactions.
//!
//! ```text
//!   Submitted ──▶ Polling ──┬──▶ Confirmed
//!                  ▲   │    ├──▶ Failed     (on-ledger error, no more polls)
//!                  └───┘    └──▶ TimedOut   (attempts exhausted)
//!               not visible
//! ```
//!
//! `TimedOut` is **not** a failure. The transaction may still land, so
//! callers must leave orders and listings untouched and re-check the same
//! signature later instead of building a new transaction.
//!
//! Server-signed transactions go through
//! [`ConfirmationTracker::submit_and_track`]: the caller records the
//! [`PendingSubmission`] first, so a lost acknowledgement is an unknown
//! outcome, never a rejection.

use std::sync::Arc;

use serde::Serialize;
use tixgate_types::{ConfirmationConfig, PendingSubmission, Result, TixgateError};

use crate::{LedgerClient, Transaction, TxStatus};

/// Final outcome of tracking one signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Confirmation {
    Confirmed { attempts: u32, finalized: bool },
    Failed { reason: String, attempts: u32 },
    TimedOut { attempts: u32 },
}

impl Confirmation {
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Confirmed { attempts, .. }
            | Self::Failed { attempts, .. }
            | Self::TimedOut { attempts } => *attempts,
        }
    }

    /// `Ok` for confirmed; `LedgerSubmissionFailed` or `ConfirmationTimeout`
    /// otherwise.
    pub fn into_result(self, signature: &str) -> Result<u32> {
        match self {
            Self::Confirmed { attempts, .. } => Ok(attempts),
            Self::Failed { reason, .. } => Err(TixgateError::LedgerSubmissionFailed {
                signature: signature.to_string(),
                reason,
            }),
            Self::TimedOut { attempts } => Err(TixgateError::ConfirmationTimeout {
                signature: signature.to_string(),
                attempts,
            }),
        }
    }
}

/// Polls the ledger for a signature's status on a fixed interval.
#[derive(Clone)]
pub struct ConfirmationTracker {
    ledger: Arc<dyn LedgerClient>,
    policy: ConfirmationConfig,
}

impl ConfirmationTracker {
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerClient>, policy: ConfirmationConfig) -> Self {
        Self { ledger, policy }
    }

    #[must_use]
    pub fn policy(&self) -> ConfirmationConfig {
        self.policy
    }

    /// Send a recorded submission, then track it.
    ///
    /// Re-checking uses the same call: identical bytes never execute twice,
    /// and a send that never arrived lands now. A transport error from the
    /// send is not a rejection; the status polls decide.
    ///
    /// # Errors
    /// Only a definite rejection before landing, such as malformed bytes or
    /// bad signatures.
    pub async fn submit_and_track(&self, pending: &PendingSubmission) -> Result<Confirmation> {
        let tx = Transaction::from_base64(&pending.transaction)?;
        match self.ledger.submit(&tx).await {
            Ok(_) => {}
            Err(err @ TixgateError::LedgerUnavailable { .. }) => {
                tracing::warn!(
                    signature = %pending.signature,
                    error = %err,
                    "Send unacknowledged, checking status"
                );
            }
            Err(err) => return Err(err),
        }
        Ok(self.track(&pending.signature).await)
    }

    /// Poll until the signature settles, errors, or attempts run out.
    ///
    /// Sleeps between polls only, never after the last one. Holds no lock
    /// while sleeping. Transport errors count as "not yet visible".
    pub async fn track(&self, signature: &str) -> Confirmation {
        let max_attempts = self.policy.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            match self.ledger.get_status(signature).await {
                Ok(status @ (TxStatus::Confirmed | TxStatus::Finalized)) => {
                    tracing::info!(
                        signature = %signature,
                        attempts = attempt,
                        "Transaction confirmed"
                    );
                    return Confirmation::Confirmed {
                        attempts: attempt,
                        finalized: status == TxStatus::Finalized,
                    };
                }
                Ok(TxStatus::Errored { reason }) => {
                    tracing::warn!(
                        signature = %signature,
                        attempts = attempt,
                        reason = %reason,
                        "Transaction failed on ledger"
                    );
                    return Confirmation::Failed {
                        reason,
                        attempts: attempt,
                    };
                }
                Ok(TxStatus::Pending | TxStatus::NotFound) => {
                    tracing::debug!(signature = %signature, attempt, "Transaction not yet confirmed");
                }
                Err(err) => {
                    tracing::debug!(signature = %signature, attempt, error = %err, "Status poll failed");
                }
            }
            if attempt < max_attempts {
                tokio::time::sleep(self.policy.interval()).await;
            }
        }
        tracing::warn!(
            signature = %signature,
            attempts = max_attempts,
            "Confirmation timed out; transaction may still land"
        );
        Confirmation::TimedOut {
            attempts: max_attempts,
        }
    }
}
