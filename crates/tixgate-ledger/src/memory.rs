//! In-process ledger for tests. **Never use in production.**
//!
//! Executes [`Instruction`]s against in-memory accounts with all-or-nothing
//! semantics, records token balance effects the way a real node reports
//! them, and lets tests script status sequences, on-ledger failures, and
//! transport outages.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tixgate_types::{Address, Result, TixgateError};

use crate::{Instruction, LedgerClient, LedgerListing, ParsedEffects, TokenBalance, Transaction, TxStatus};

#[derive(Debug, Clone)]
struct EndpointAccount {
    treasury: Address,
    supply: u32,
    minted: u32,
    price: u64,
}

#[derive(Debug, Clone)]
struct RegistryAccount {
    authority: Address,
    requires_authority: bool,
}

#[derive(Debug, Clone, Default)]
struct Accounts {
    balances: HashMap<Address, u64>,
    /// Asset (mint) → current owner.
    assets: HashMap<Address, Address>,
    endpoints: HashMap<Address, EndpointAccount>,
    registries: HashMap<Address, RegistryAccount>,
    listings: HashMap<Address, LedgerListing>,
}

#[derive(Debug)]
struct Landed {
    effects: ParsedEffects,
    /// Statuses returned before the real outcome becomes visible.
    scripted: VecDeque<TxStatus>,
}

#[derive(Debug, Default)]
struct State {
    accounts: Accounts,
    transactions: HashMap<String, Landed>,
    submissions: Vec<String>,
    status_polls: HashMap<String, u32>,
    next_delay: Option<u32>,
    next_failure: Option<String>,
    unavailable_submits: u32,
    lost_acks: u32,
}

/// An in-memory [`LedgerClient`].
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<State>,
}

impl MemoryLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Credit native currency.
    pub fn airdrop(&self, address: &Address, amount: u64) {
        *self.lock().accounts.balances.entry(address.clone()).or_default() += amount;
    }

    #[must_use]
    pub fn balance_of(&self, address: &Address) -> u64 {
        self.lock().accounts.balances.get(address).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn owner_of(&self, asset: &Address) -> Option<Address> {
        self.lock().accounts.assets.get(asset).cloned()
    }

    #[must_use]
    pub fn endpoint_count(&self) -> usize {
        self.lock().accounts.endpoints.len()
    }

    /// Every signature accepted by `submit`, in order (duplicates included).
    #[must_use]
    pub fn submissions(&self) -> Vec<String> {
        self.lock().submissions.clone()
    }

    #[must_use]
    pub fn polls_for(&self, signature: &str) -> u32 {
        self.lock().status_polls.get(signature).copied().unwrap_or(0)
    }

    /// The next submitted transaction reports `Pending` for `polls` polls
    /// before its real outcome.
    pub fn delay_next_submission(&self, polls: u32) {
        self.lock().next_delay = Some(polls);
    }

    /// The next submitted transaction lands with an on-ledger error and
    /// changes nothing.
    pub fn fail_next_submission(&self, reason: &str) {
        self.lock().next_failure = Some(reason.to_string());
    }

    /// The next `count` submissions fail at the transport level.
    pub fn make_unavailable(&self, count: u32) {
        self.lock().unavailable_submits = count;
    }

    /// The next new submission lands, but `submit` reports a transport
    /// error as if the acknowledgement was lost on the way back.
    pub fn drop_next_ack(&self) {
        self.lock().lost_acks += 1;
    }

    /// Append pending statuses in front of an already landed transaction.
    pub fn hold_pending(&self, signature: &str, polls: u32) {
        if let Some(landed) = self.lock().transactions.get_mut(signature) {
            landed.scripted.extend((0..polls).map(|_| TxStatus::Pending));
        }
    }

    /// Create a listing account directly, bypassing the marketplace program.
    pub fn put_listing(&self, listing: LedgerListing) {
        let mut state = self.lock();
        state
            .accounts
            .assets
            .insert(listing.asset.clone(), listing.seller.clone());
        state.accounts.listings.insert(listing.address.clone(), listing);
    }
}

fn debit(accounts: &mut Accounts, from: &Address, amount: u64) -> std::result::Result<(), String> {
    let balance = accounts.balances.entry(from.clone()).or_default();
    if *balance < amount {
        return Err(format!("insufficient funds: {from} has {balance}, needs {amount}"));
    }
    *balance -= amount;
    Ok(())
}

fn credit(accounts: &mut Accounts, to: &Address, amount: u64) {
    *accounts.balances.entry(to.clone()).or_default() += amount;
}

fn ticket_line(mint: &Address, owner: &Address, amount: u64) -> TokenBalance {
    TokenBalance {
        mint: mint.clone(),
        owner: owner.clone(),
        amount,
        decimals: 0,
    }
}

/// Apply one instruction, appending token balance effects.
fn execute(
    accounts: &mut Accounts,
    instruction: &Instruction,
    pre: &mut Vec<TokenBalance>,
    post: &mut Vec<TokenBalance>,
) -> std::result::Result<(), String> {
    match instruction {
        Instruction::CreateEndpoint {
            endpoint,
            treasury,
            supply,
            price,
            ..
        } => {
            if accounts.endpoints.contains_key(endpoint) {
                return Err(format!("endpoint {endpoint} already exists"));
            }
            accounts.endpoints.insert(
                endpoint.clone(),
                EndpointAccount {
                    treasury: treasury.clone(),
                    supply: *supply,
                    minted: 0,
                    price: *price,
                },
            );
        }
        Instruction::Mint {
            endpoint,
            payer,
            recipient,
            quantity,
        } => {
            let account = accounts
                .endpoints
                .get(endpoint)
                .cloned()
                .ok_or_else(|| format!("unknown endpoint {endpoint}"))?;
            if account.minted + quantity > account.supply {
                return Err("endpoint supply exhausted".into());
            }
            debit(accounts, payer, account.price * u64::from(*quantity))?;
            credit(accounts, &account.treasury, account.price * u64::from(*quantity));
            for _ in 0..*quantity {
                let asset = Address::random();
                accounts.assets.insert(asset.clone(), recipient.clone());
                post.push(ticket_line(&asset, recipient, 1));
            }
            if let Some(ep) = accounts.endpoints.get_mut(endpoint) {
                ep.minted += quantity;
            }
        }
        Instruction::CreateRegistry {
            registry,
            authority,
            requires_authority,
        } => {
            if accounts.registries.contains_key(registry) {
                return Err(format!("registry {registry} already exists"));
            }
            accounts.registries.insert(
                registry.clone(),
                RegistryAccount {
                    authority: authority.clone(),
                    requires_authority: *requires_authority,
                },
            );
        }
        Instruction::ListAsset {
            registry,
            listing,
            seller,
            asset,
            price,
        } => {
            let reg = accounts
                .registries
                .get(registry)
                .cloned()
                .ok_or_else(|| format!("unknown registry {registry}"))?;
            if accounts.assets.get(asset) != Some(seller) {
                return Err(format!("{seller} does not own {asset}"));
            }
            if accounts.listings.values().any(|l| l.active && &l.asset == asset) {
                return Err(format!("{asset} already listed"));
            }
            accounts.listings.insert(
                listing.clone(),
                LedgerListing {
                    address: listing.clone(),
                    registry: registry.clone(),
                    seller: seller.clone(),
                    asset: asset.clone(),
                    price: *price,
                    active: true,
                    authority: reg.requires_authority.then_some(reg.authority),
                },
            );
        }
        Instruction::BuyListing {
            listing,
            buyer,
            recipient,
            seller,
            asset,
            price,
            authority,
            ..
        } => {
            let current = accounts
                .listings
                .get(listing)
                .cloned()
                .ok_or_else(|| format!("unknown listing {listing}"))?;
            if !current.active {
                return Err("listing not active".into());
            }
            if &current.seller != seller || &current.asset != asset || current.price != *price {
                return Err("listing terms mismatch".into());
            }
            if current.authority.is_some() && current.authority != *authority {
                return Err("missing marketplace authority".into());
            }
            debit(accounts, buyer, *price)?;
            credit(accounts, seller, *price);
            accounts.assets.insert(asset.clone(), recipient.clone());
            if let Some(l) = accounts.listings.get_mut(listing) {
                l.active = false;
            }
            pre.push(ticket_line(asset, seller, 1));
            post.push(ticket_line(asset, seller, 0));
            post.push(ticket_line(asset, recipient, 1));
        }
        Instruction::CancelListing {
            listing, seller, ..
        } => {
            let current = accounts
                .listings
                .get_mut(listing)
                .ok_or_else(|| format!("unknown listing {listing}"))?;
            if !current.active {
                return Err("listing not active".into());
            }
            if &current.seller != seller {
                return Err("only the seller may cancel".into());
            }
            current.active = false;
        }
        Instruction::Transfer { from, to, amount } => {
            debit(accounts, from, *amount)?;
            credit(accounts, to, *amount);
        }
    }
    Ok(())
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn submit(&self, transaction: &Transaction) -> Result<String> {
        transaction.verify_signatures()?;
        let signature = transaction
            .signature()
            .ok_or_else(|| TixgateError::MissingSignature {
                signer: transaction.fee_payer.clone(),
            })?
            .to_string();

        let mut state = self.lock();
        if state.unavailable_submits > 0 {
            state.unavailable_submits -= 1;
            return Err(TixgateError::LedgerUnavailable {
                reason: "connection refused".into(),
            });
        }
        state.submissions.push(signature.clone());
        if state.transactions.contains_key(&signature) {
            return Ok(signature);
        }

        let mut scripted = VecDeque::new();
        if let Some(polls) = state.next_delay.take() {
            scripted.extend((0..polls).map(|_| TxStatus::Pending));
        }

        let mut pre = Vec::new();
        let mut post = Vec::new();
        let error = if let Some(reason) = state.next_failure.take() {
            Some(reason)
        } else {
            let mut accounts = state.accounts.clone();
            let outcome = transaction
                .instructions
                .iter()
                .try_for_each(|ix| execute(&mut accounts, ix, &mut pre, &mut post));
            match outcome {
                Ok(()) => {
                    state.accounts = accounts;
                    None
                }
                Err(reason) => Some(reason),
            }
        };
        if error.is_some() {
            pre.clear();
            post.clear();
        }

        state.transactions.insert(
            signature.clone(),
            Landed {
                effects: ParsedEffects {
                    signature: signature.clone(),
                    error,
                    pre_token_balances: pre,
                    post_token_balances: post,
                },
                scripted,
            },
        );
        if state.lost_acks > 0 {
            state.lost_acks -= 1;
            return Err(TixgateError::LedgerUnavailable {
                reason: "connection reset after send".into(),
            });
        }
        Ok(signature)
    }

    async fn get_status(&self, signature: &str) -> Result<TxStatus> {
        let mut state = self.lock();
        *state.status_polls.entry(signature.to_string()).or_default() += 1;
        let Some(landed) = state.transactions.get_mut(signature) else {
            return Ok(TxStatus::NotFound);
        };
        if let Some(status) = landed.scripted.pop_front() {
            return Ok(status);
        }
        Ok(match &landed.effects.error {
            Some(reason) => TxStatus::Errored {
                reason: reason.clone(),
            },
            None => TxStatus::Confirmed,
        })
    }

    async fn get_parsed_effects(&self, signature: &str) -> Result<Option<ParsedEffects>> {
        Ok(self
            .lock()
            .transactions
            .get(signature)
            .map(|landed| landed.effects.clone()))
    }

    async fn get_balance(&self, address: &Address) -> Result<u64> {
        Ok(self.balance_of(address))
    }

    async fn get_listing(&self, listing: &Address) -> Result<Option<LedgerListing>> {
        Ok(self.lock().accounts.listings.get(listing).cloned())
    }
}
