//! Effect extraction: which ticket assets did a confirmed transaction hand to
//! the recipient?
//!
//! Ticket assets are zero-decimal token mints of supply 1. An asset counts as
//! newly attributable to the recipient when its post-state balance line has
//! `decimals == 0`, is owned by the recipient, and grew by exactly 1 against
//! the pre-state. This ignores unrelated balance changes in the same
//! transaction, such as fee or payment token movements.

use tixgate_types::{Address, Result, TixgateError};

use crate::{ParsedEffects, TokenBalance};

/// Extracts assets received by one recipient.
pub struct EffectExtractor<'a> {
    recipient: &'a Address,
}

impl<'a> EffectExtractor<'a> {
    #[must_use]
    pub fn new(recipient: &'a Address) -> Self {
        Self { recipient }
    }

    /// Qualifying asset addresses, in post-balance order, deduplicated.
    #[must_use]
    pub fn extract(&self, effects: &ParsedEffects) -> Vec<Address> {
        let mut assets: Vec<Address> = Vec::new();
        for post in &effects.post_token_balances {
            if post.decimals != 0 || &post.owner != self.recipient {
                continue;
            }
            let pre = Self::pre_amount(&effects.pre_token_balances, post);
            if post.amount.checked_sub(pre) == Some(1) && !assets.contains(&post.mint) {
                assets.push(post.mint.clone());
            }
        }
        assets
    }

    /// Like [`extract`](Self::extract) but an empty result is an error: a
    /// confirmed transaction that delivered nothing is an upstream logic
    /// error, not a successful purchase.
    ///
    /// # Errors
    /// Returns [`TixgateError::EffectExtractionEmpty`].
    pub fn require(&self, effects: &ParsedEffects) -> Result<Vec<Address>> {
        let assets = self.extract(effects);
        if assets.is_empty() {
            tracing::error!(
                signature = %effects.signature,
                recipient = %self.recipient,
                "Confirmed transaction produced no attributable asset"
            );
            return Err(TixgateError::EffectExtractionEmpty {
                signature: effects.signature.clone(),
                recipient: self.recipient.clone(),
            });
        }
        Ok(assets)
    }

    /// Whether `asset` is among the assets the recipient received.
    #[must_use]
    pub fn received(&self, effects: &ParsedEffects, asset: &Address) -> bool {
        self.extract(effects).contains(asset)
    }

    fn pre_amount(pre: &[TokenBalance], post: &TokenBalance) -> u64 {
        pre.iter()
            .find(|b| b.mint == post.mint && b.owner == post.owner)
            .map_or(0, |b| b.amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balance(mint: &Address, owner: &Address, amount: u64, decimals: u8) -> TokenBalance {
        TokenBalance {
            mint: mint.clone(),
            owner: owner.clone(),
            amount,
            decimals,
        }
    }

    fn effects(pre: Vec<TokenBalance>, post: Vec<TokenBalance>) -> ParsedEffects {
        ParsedEffects {
            signature: "sig".into(),
            error: None,
            pre_token_balances: pre,
            post_token_balances: post,
        }
    }

    #[test]
    fn picks_ticket_and_ignores_fungible_entry() {
        let buyer = Address::random();
        let ticket = Address::random();
        let usdc = Address::random();
        let fx = effects(
            vec![],
            vec![
                balance(&ticket, &buyer, 1, 0),
                balance(&usdc, &buyer, 1, 9),
            ],
        );
        assert_eq!(EffectExtractor::new(&buyer).extract(&fx), vec![ticket]);
    }

    #[test]
    fn ignores_other_owners_and_unchanged_balances() {
        let buyer = Address::random();
        let seller = Address::random();
        let held = Address::random();
        let fresh = Address::random();
        let fx = effects(
            vec![balance(&held, &buyer, 1, 0)],
            vec![
                balance(&held, &buyer, 1, 0),
                balance(&fresh, &seller, 1, 0),
            ],
        );
        assert!(EffectExtractor::new(&buyer).extract(&fx).is_empty());
    }

    #[test]
    fn resale_transfer_counts_for_new_owner_only() {
        let buyer = Address::random();
        let seller = Address::random();
        let asset = Address::random();
        let fx = effects(
            vec![balance(&asset, &seller, 1, 0)],
            vec![balance(&asset, &seller, 0, 0), balance(&asset, &buyer, 1, 0)],
        );
        assert!(EffectExtractor::new(&buyer).received(&fx, &asset));
        assert!(!EffectExtractor::new(&seller).received(&fx, &asset));
    }

    #[test]
    fn keeps_order_of_multiple_mints() {
        let buyer = Address::random();
        let first = Address::random();
        let second = Address::random();
        let fx = effects(
            vec![],
            vec![balance(&first, &buyer, 1, 0), balance(&second, &buyer, 1, 0)],
        );
        assert_eq!(
            EffectExtractor::new(&buyer).require(&fx).unwrap(),
            vec![first, second]
        );
    }

    #[test]
    fn empty_extraction_is_an_error() {
        let buyer = Address::random();
        let fx = effects(vec![], vec![balance(&Address::random(), &buyer, 5, 0)]);
        let err = EffectExtractor::new(&buyer).require(&fx).unwrap_err();
        assert!(matches!(err, TixgateError::EffectExtractionEmpty { .. }));
    }
}
