//! Signed transactions whose landing is not yet known.

use serde::{Deserialize, Serialize};

/// A fully signed transaction, recorded before it is sent.
///
/// The ledger signature is computed locally, so a send whose
/// acknowledgement is lost can be re-checked by signature and re-sent byte
/// for byte. Re-sending identical bytes never executes twice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSubmission {
    pub signature: String,
    /// Base64 wire form.
    pub transaction: String,
}
