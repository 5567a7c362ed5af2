//! Local settlement store.
//!
//! In-process transactional tables behind one `Mutex`. Every public method
//! is one critical section, so each is atomic with respect to the others.
//! Unique indexes:
//!
//! | Index | Enforces |
//! |-------|----------|
//! | wallet → user | one user per wallet |
//! | event → endpoint marker | one issuance endpoint per event |
//! | signature → order | a transaction confirms at most one order |
//! | asset → ticket | one ticket per minted asset |
//! | asset → listing slot | at most one active (or in-flight) listing per asset |
//! | order → distribution | at most one payout per order |
//!
//! Status transitions re-check the expected prior state inside the critical
//! section. No method awaits, so no guard is ever held across `.await`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tixgate_types::{
    Address, DistributionReplay, EndpointState, Event, EventId, Listing, ListingId,
    ListingStatus, Order, OrderId, OrderStatus, PaymentDistribution, PendingSubmission, Result,
    Ticket, TicketId, TixgateError, User, UserId,
};

/// What a caller got from [`SettlementLedger::claim_endpoint`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointClaim {
    /// The marker was inserted by this call; the caller must create the
    /// endpoint on the ledger.
    Claimed,
    /// Another request got there first.
    Existing(EndpointState),
}

/// A listing that is being created but not yet confirmed on the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingReservation {
    pub asset: Address,
    pub seller: UserId,
    pub price: u64,
    /// On-ledger listing account, once the transaction is signed.
    pub handle: Option<Address>,
    /// Recorded before the listing transaction is sent.
    pub submission: Option<PendingSubmission>,
}

/// A registry creation recorded before it was sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryCreation {
    pub registry: Address,
    pub submission: PendingSubmission,
}

#[derive(Debug, Clone)]
enum ListingSlot {
    Reserved(ListingReservation),
    Active(ListingId),
}

/// Result of recording a confirmed mint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintRecord {
    pub order: Order,
    pub tickets: Vec<Ticket>,
    /// `false` when the same confirmation had already been recorded.
    pub newly_recorded: bool,
}

/// Result of a sale or cancellation transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Applied(Listing),
    /// The listing was already in the requested state.
    AlreadyApplied(Listing),
}

impl Transition {
    #[must_use]
    pub fn listing(&self) -> &Listing {
        match self {
            Self::Applied(listing) | Self::AlreadyApplied(listing) => listing,
        }
    }

    #[must_use]
    pub fn into_listing(self) -> Listing {
        match self {
            Self::Applied(listing) | Self::AlreadyApplied(listing) => listing,
        }
    }
}

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    user_by_wallet: HashMap<Address, UserId>,
    events: HashMap<EventId, Event>,
    endpoints: HashMap<EventId, EndpointState>,
    orders: HashMap<OrderId, Order>,
    order_by_signature: HashMap<String, OrderId>,
    tickets: HashMap<TicketId, Ticket>,
    ticket_by_asset: HashMap<Address, TicketId>,
    listings: HashMap<ListingId, Listing>,
    listing_slots: HashMap<Address, ListingSlot>,
    distributions: HashMap<OrderId, PaymentDistribution>,
    replays: HashMap<OrderId, DistributionReplay>,
    platform_config: BTreeMap<String, String>,
    registry_creation: Option<RegistryCreation>,
}

/// The settlement store.
#[derive(Debug, Default)]
pub struct SettlementLedger {
    tables: Mutex<Tables>,
}

impl SettlementLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // --- users ------------------------------------------------------------

    /// The user for `wallet`, created on first sight.
    pub fn ensure_user(&self, wallet: &Address) -> User {
        let mut t = self.lock();
        if let Some(user) = t.user_by_wallet.get(wallet).and_then(|id| t.users.get(id)) {
            return user.clone();
        }
        let user = User::new(wallet.clone());
        t.user_by_wallet.insert(wallet.clone(), user.id);
        t.users.insert(user.id, user.clone());
        tracing::info!(user = %user.id, wallet = %wallet, "User created");
        user
    }

    #[must_use]
    pub fn user(&self, id: UserId) -> Option<User> {
        self.lock().users.get(&id).cloned()
    }

    pub fn set_custodial_hint(&self, id: UserId, custodial: &Address) {
        if let Some(user) = self.lock().users.get_mut(&id) {
            user.custodial_hint = Some(custodial.clone());
        }
    }

    // --- events and issuance endpoints -------------------------------------

    pub fn insert_event(&self, event: Event) {
        self.lock().events.insert(event.id, event);
    }

    pub fn event(&self, id: EventId) -> Result<Event> {
        self.lock()
            .events
            .get(&id)
            .cloned()
            .ok_or(TixgateError::EventNotFound(id))
    }

    /// Insert-if-absent the endpoint marker for `event`.
    pub fn claim_endpoint(&self, event: EventId, address: &Address) -> EndpointClaim {
        let mut t = self.lock();
        if let Some(existing) = t.endpoints.get(&event) {
            return EndpointClaim::Existing(existing.clone());
        }
        t.endpoints.insert(event, unsent_claim(address));
        EndpointClaim::Claimed
    }

    /// Take over a claim that never recorded a creation transaction.
    ///
    /// Compare-and-swap: succeeds only if the marker still names `stale`,
    /// has nothing recorded, and was claimed at or before `claimed_before`.
    pub fn reclaim_endpoint(
        &self,
        event: EventId,
        stale: &Address,
        fresh: &Address,
        claimed_before: DateTime<Utc>,
    ) -> bool {
        let mut t = self.lock();
        let Some(EndpointState::Pending {
            address,
            creation: None,
            claimed_at,
        }) = t.endpoints.get(&event)
        else {
            return false;
        };
        if address != stale || *claimed_at > claimed_before {
            return false;
        }
        t.endpoints.insert(event, unsent_claim(fresh));
        tracing::warn!(event = %event, stale = %stale, endpoint = %fresh, "Stale endpoint claim taken over");
        true
    }

    #[must_use]
    pub fn endpoint(&self, event: EventId) -> Option<EndpointState> {
        self.lock().endpoints.get(&event).cloned()
    }

    /// Record the signed creation transaction of the claim naming `address`,
    /// before it is sent. `false` if the claim is no longer this caller's.
    pub fn note_endpoint_submission(
        &self,
        event: EventId,
        address: &Address,
        submission: &PendingSubmission,
    ) -> bool {
        match self.lock().endpoints.get_mut(&event) {
            Some(EndpointState::Pending {
                address: claimed,
                creation,
                ..
            }) if claimed == address => {
                *creation = Some(submission.clone());
                true
            }
            _ => false,
        }
    }

    /// `Pending → Ready`. Idempotent for an already ready endpoint.
    pub fn complete_endpoint(&self, event: EventId, signature: &str) -> Result<Address> {
        let mut t = self.lock();
        let state = t
            .endpoints
            .get_mut(&event)
            .ok_or(TixgateError::EventNotFound(event))?;
        let address = state.address().clone();
        if !state.is_ready() {
            *state = EndpointState::Ready {
                address: address.clone(),
                creation_signature: signature.to_string(),
            };
            tracing::info!(event = %event, endpoint = %address, "Issuance endpoint ready");
        }
        Ok(address)
    }

    /// Drop a pending marker whose creation definitely did not happen.
    /// Only removes the marker if it still names `address`.
    pub fn release_endpoint(&self, event: EventId, address: &Address) {
        let mut t = self.lock();
        if matches!(t.endpoints.get(&event), Some(EndpointState::Pending { address: a, .. }) if a == address)
        {
            t.endpoints.remove(&event);
        }
    }

    // --- orders and tickets ------------------------------------------------

    pub fn insert_order(&self, order: Order) {
        self.lock().orders.insert(order.id, order);
    }

    pub fn order(&self, id: OrderId) -> Result<Order> {
        self.lock()
            .orders
            .get(&id)
            .cloned()
            .ok_or(TixgateError::OrderNotFound(id))
    }

    /// `Pending → Failed` after an explicit on-ledger rejection.
    pub fn fail_order(&self, id: OrderId, signature: &str, reason: &str) -> Result<Order> {
        let mut t = self.lock();
        let order = t.orders.get_mut(&id).ok_or(TixgateError::OrderNotFound(id))?;
        order.mark_failed(signature, reason)?;
        Ok(order.clone())
    }

    /// Record a confirmed mint in one step: order confirmed, one ticket per
    /// asset with sequential display indexes, event availability decremented.
    ///
    /// Re-recording the same `(order, signature)` returns the existing
    /// tickets without changes.
    pub fn record_mint(&self, id: OrderId, signature: &str, assets: &[Address]) -> Result<MintRecord> {
        let mut t = self.lock();
        let order = t.orders.get(&id).cloned().ok_or(TixgateError::OrderNotFound(id))?;

        if order.status == OrderStatus::Confirmed && order.tx_signature.as_deref() == Some(signature) {
            let tickets = tickets_of(&t, id);
            return Ok(MintRecord {
                order,
                tickets,
                newly_recorded: false,
            });
        }
        if order.status != OrderStatus::Pending {
            return Err(TixgateError::OrderNotPending {
                order: id,
                status: order.status.to_string(),
            });
        }
        if let Some(other) = t.order_by_signature.get(signature) {
            return Err(TixgateError::Internal(format!(
                "transaction {signature} already confirmed order {other}"
            )));
        }
        if let Some(dup) = assets.iter().find(|a| t.ticket_by_asset.contains_key(*a)) {
            return Err(TixgateError::AssetAlreadyRecorded(dup.clone()));
        }
        let minted = u32::try_from(assets.len())
            .map_err(|_| TixgateError::Internal("asset count overflow".into()))?;
        let event = t
            .events
            .get(&order.event_id)
            .cloned()
            .ok_or(TixgateError::EventNotFound(order.event_id))?;
        if event.tickets_available < minted {
            return Err(TixgateError::SoldOut {
                requested: minted,
                available: event.tickets_available,
            });
        }

        let mut order = order;
        order.mark_confirmed(signature)?;
        let now = Utc::now();
        let tickets: Vec<Ticket> = assets
            .iter()
            .zip(event.next_ticket_index..)
            .map(|(asset, display_index)| Ticket {
                id: TicketId::new(),
                order_id: id,
                event_id: event.id,
                owner: order.user_id,
                asset: asset.clone(),
                display_index,
                original_price: event.ticket_price,
                is_valid: true,
                is_used: false,
                minted_at: now,
            })
            .collect();

        for ticket in &tickets {
            t.ticket_by_asset.insert(ticket.asset.clone(), ticket.id);
            t.tickets.insert(ticket.id, ticket.clone());
        }
        if let Some(e) = t.events.get_mut(&event.id) {
            e.tickets_available -= minted;
            e.next_ticket_index += minted;
        }
        t.order_by_signature.insert(signature.to_string(), id);
        t.orders.insert(id, order.clone());

        Ok(MintRecord {
            order,
            tickets,
            newly_recorded: true,
        })
    }

    #[must_use]
    pub fn tickets_for_order(&self, id: OrderId) -> Vec<Ticket> {
        tickets_of(&self.lock(), id)
    }

    pub fn ticket_by_asset(&self, asset: &Address) -> Result<Ticket> {
        let t = self.lock();
        t.ticket_by_asset
            .get(asset)
            .and_then(|id| t.tickets.get(id))
            .cloned()
            .ok_or_else(|| TixgateError::TicketNotFound(asset.clone()))
    }

    // --- listings ----------------------------------------------------------

    /// Reserve the asset's listing slot for `seller`.
    ///
    /// # Errors
    /// [`TixgateError::DuplicateActiveListing`] if the asset already has an
    /// active listing or an in-flight reservation.
    pub fn reserve_listing(&self, asset: &Address, seller: UserId, price: u64) -> Result<()> {
        let mut t = self.lock();
        if t.listing_slots.contains_key(asset) {
            return Err(TixgateError::DuplicateActiveListing {
                asset: asset.clone(),
            });
        }
        t.listing_slots.insert(
            asset.clone(),
            ListingSlot::Reserved(ListingReservation {
                asset: asset.clone(),
                seller,
                price,
                handle: None,
                submission: None,
            }),
        );
        Ok(())
    }

    /// Record the signed listing transaction before it is sent.
    pub fn note_listing_submission(
        &self,
        asset: &Address,
        handle: &Address,
        submission: &PendingSubmission,
    ) {
        if let Some(ListingSlot::Reserved(r)) = self.lock().listing_slots.get_mut(asset) {
            r.handle = Some(handle.clone());
            r.submission = Some(submission.clone());
        }
    }

    #[must_use]
    pub fn listing_reservation(&self, asset: &Address) -> Option<ListingReservation> {
        match self.lock().listing_slots.get(asset) {
            Some(ListingSlot::Reserved(r)) => Some(r.clone()),
            _ => None,
        }
    }

    pub fn release_listing_reservation(&self, asset: &Address) {
        let mut t = self.lock();
        if matches!(t.listing_slots.get(asset), Some(ListingSlot::Reserved(_))) {
            t.listing_slots.remove(asset);
        }
    }

    /// Turn the seller's reservation into an active listing.
    pub fn activate_listing(&self, listing: Listing) -> Result<Listing> {
        let mut t = self.lock();
        match t.listing_slots.get(&listing.asset) {
            Some(ListingSlot::Reserved(r)) if r.seller == listing.seller => {}
            _ => {
                return Err(TixgateError::DuplicateActiveListing {
                    asset: listing.asset.clone(),
                });
            }
        }
        t.listing_slots
            .insert(listing.asset.clone(), ListingSlot::Active(listing.id));
        t.listings.insert(listing.id, listing.clone());
        Ok(listing)
    }

    pub fn listing(&self, id: ListingId) -> Result<Listing> {
        self.lock()
            .listings
            .get(&id)
            .cloned()
            .ok_or(TixgateError::ListingNotFound(id))
    }

    #[must_use]
    pub fn active_listing_for(&self, asset: &Address) -> Option<Listing> {
        let t = self.lock();
        match t.listing_slots.get(asset) {
            Some(ListingSlot::Active(id)) => t.listings.get(id).cloned(),
            _ => None,
        }
    }

    /// `Active → Sold` and ticket ownership to `buyer`, in one step.
    /// A listing already sold is returned unchanged.
    pub fn complete_sale(&self, id: ListingId, buyer: UserId, signature: &str) -> Result<Transition> {
        let mut t = self.lock();
        let mut listing = t.listings.get(&id).cloned().ok_or(TixgateError::ListingNotFound(id))?;
        if listing.status == ListingStatus::Sold {
            return Ok(Transition::AlreadyApplied(listing));
        }
        let ticket_id = *t
            .ticket_by_asset
            .get(&listing.asset)
            .ok_or_else(|| TixgateError::TicketNotFound(listing.asset.clone()))?;

        listing.mark_sold(buyer, signature)?;
        if let Some(ticket) = t.tickets.get_mut(&ticket_id) {
            ticket.owner = buyer;
        }
        t.listing_slots.remove(&listing.asset);
        t.listings.insert(id, listing.clone());
        Ok(Transition::Applied(listing))
    }

    /// `Active → Cancelled`. A listing already cancelled by the same
    /// transaction is returned unchanged.
    pub fn cancel_listing(&self, id: ListingId, signature: &str) -> Result<Transition> {
        let mut t = self.lock();
        let mut listing = t.listings.get(&id).cloned().ok_or(TixgateError::ListingNotFound(id))?;
        if listing.status == ListingStatus::Cancelled
            && listing.closing_signature.as_deref() == Some(signature)
        {
            return Ok(Transition::AlreadyApplied(listing));
        }
        listing.mark_cancelled(signature)?;
        t.listing_slots.remove(&listing.asset);
        t.listings.insert(id, listing.clone());
        Ok(Transition::Applied(listing))
    }

    // --- distributions -----------------------------------------------------

    /// Store a payout. The first one recorded for an order wins and clears
    /// any replay row.
    pub fn record_distribution(&self, distribution: PaymentDistribution) -> PaymentDistribution {
        let mut t = self.lock();
        t.replays.remove(&distribution.order_id);
        t.distributions
            .entry(distribution.order_id)
            .or_insert(distribution)
            .clone()
    }

    #[must_use]
    pub fn distribution(&self, order: OrderId) -> Option<PaymentDistribution> {
        self.lock().distributions.get(&order).cloned()
    }

    /// Upsert the replay row for a failed payout, counting attempts.
    pub fn record_distribution_failure(&self, mut replay: DistributionReplay) -> DistributionReplay {
        let mut t = self.lock();
        if let Some(previous) = t.replays.get(&replay.order_id) {
            replay.attempts = previous.attempts + 1;
        } else {
            replay.attempts = 1;
        }
        t.replays.insert(replay.order_id, replay.clone());
        replay
    }

    #[must_use]
    pub fn distribution_replay(&self, order: OrderId) -> Option<DistributionReplay> {
        self.lock().replays.get(&order).cloned()
    }

    /// Replay rows, oldest first.
    #[must_use]
    pub fn pending_distributions(&self) -> Vec<DistributionReplay> {
        let mut rows: Vec<_> = self.lock().replays.values().cloned().collect();
        rows.sort_by_key(|r| r.updated_at);
        rows
    }

    // --- platform config ---------------------------------------------------

    #[must_use]
    pub fn platform_config(&self, key: &str) -> Option<String> {
        self.lock().platform_config.get(key).cloned()
    }

    /// Write-once setting. Writing the same value again is a no-op.
    ///
    /// # Errors
    /// [`TixgateError::PlatformConfigConflict`] if a different value is set.
    pub fn set_platform_config(&self, key: &str, value: &str) -> Result<()> {
        let mut t = self.lock();
        match t.platform_config.get(key) {
            Some(existing) if existing == value => Ok(()),
            Some(_) => Err(TixgateError::PlatformConfigConflict {
                key: key.to_string(),
            }),
            None => {
                t.platform_config.insert(key.to_string(), value.to_string());
                Ok(())
            }
        }
    }

    /// Record a signed registry creation before it is sent. Insert-if-absent:
    /// returns whichever creation is recorded, this one or an earlier one.
    pub fn begin_registry_creation(&self, creation: RegistryCreation) -> RegistryCreation {
        self.lock()
            .registry_creation
            .get_or_insert(creation)
            .clone()
    }

    #[must_use]
    pub fn registry_creation(&self) -> Option<RegistryCreation> {
        self.lock().registry_creation.clone()
    }

    /// Drop the recorded creation of `registry`, once it has settled.
    pub fn clear_registry_creation(&self, registry: &Address) {
        let mut t = self.lock();
        if t.registry_creation
            .as_ref()
            .is_some_and(|c| &c.registry == registry)
        {
            t.registry_creation = None;
        }
    }
}

fn unsent_claim(address: &Address) -> EndpointState {
    EndpointState::Pending {
        address: address.clone(),
        creation: None,
        claimed_at: Utc::now(),
    }
}

fn tickets_of(t: &Tables, order: OrderId) -> Vec<Ticket> {
    let mut tickets: Vec<Ticket> = t
        .tickets
        .values()
        .filter(|ticket| ticket.order_id == order)
        .cloned()
        .collect();
    tickets.sort_by_key(|ticket| ticket.display_index);
    tickets
}
