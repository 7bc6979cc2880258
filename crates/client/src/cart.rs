//! Serialized cart synchronization engine.
//!
//! [`CartSync`] owns the single local cart projection. Every mutating call
//! obtains a session first (the network is never contacted without one),
//! executes its transport call through the retry executor, then merges the
//! server's authoritative line list wholesale - replacing the projection, not
//! patching it line-by-line, so the local state cannot diverge from the
//! server's. Enrichment and reconciliation run after every merge.
//!
//! Mutations are serialized through a fair async mutex: a second call issued
//! while one is pending queues behind it in submission order, so responses
//! merge in the order the user acted and no lost-update can occur. Read-only
//! [`CartSync::cart`] calls interleave freely against the latest published
//! projection.
//!
//! A failed mutation leaves the projection bit-for-bit untouched; the
//! failure is surfaced both as the returned error and as a published
//! [`Outcome`] for the UI boundary.

use core::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use tableside_core::{LineId, MenuItemId};
use tokio::sync::{Mutex, RwLock, watch};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::api::{AddLineRequest, ApiError, CartSnapshot, OrderApi, UpdateLineRequest};
use crate::catalog::CatalogResolver;
use crate::error::ClientError;
use crate::pricing;
use crate::retry::RetryPolicy;
use crate::session::SessionManager;
use crate::types::{Cart, CustomizationChoices, Totals};

// =============================================================================
// Outcomes
// =============================================================================

/// The kind of a cart mutation, for logging and outcome construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Add,
    UpdateQuantity,
    Remove,
    Clear,
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Add => "add",
            Self::UpdateQuantity => "update_quantity",
            Self::Remove => "remove",
            Self::Clear => "clear",
        })
    }
}

/// Human-readable result of a cart operation, published alongside the
/// projection for the UI boundary to render. Distinct from the returned
/// [`Cart`] value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing has happened yet.
    Idle,
    ItemAdded,
    CartUpdated,
    ItemRemoved,
    CartCleared,
    /// The projection was refreshed from the server without a mutation.
    Refreshed,
    /// A queued mutation was dropped because a later clear superseded it.
    Superseded,
    /// The named mutation failed; the projection is unchanged.
    Failed(OpKind),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str(""),
            Self::ItemAdded => f.write_str("Item added to cart"),
            Self::CartUpdated => f.write_str("Cart updated"),
            Self::ItemRemoved => f.write_str("Item removed from cart"),
            Self::CartCleared => f.write_str("Cart cleared"),
            Self::Refreshed => f.write_str("Cart refreshed"),
            Self::Superseded => f.write_str("Cart update skipped"),
            Self::Failed(OpKind::Add) => f.write_str("Failed to add item to cart"),
            Self::Failed(OpKind::UpdateQuantity) => f.write_str("Failed to update cart"),
            Self::Failed(OpKind::Remove) => f.write_str("Failed to remove item from cart"),
            Self::Failed(OpKind::Clear) => f.write_str("Failed to clear cart"),
        }
    }
}

/// A published cart state change.
#[derive(Debug, Clone)]
pub struct CartEvent {
    /// The projection after the operation.
    pub cart: Cart,
    /// What happened.
    pub outcome: Outcome,
}

/// A mutation in flight. Exists only for the duration of the call.
struct PendingOperation {
    id: Uuid,
    kind: OpKind,
    attempts: AtomicU32,
}

impl PendingOperation {
    fn new(kind: OpKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            attempts: AtomicU32::new(0),
        }
    }

    fn note_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::SeqCst);
    }

    fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Engine
// =============================================================================

/// The cart synchronization engine. Cheap to clone; all clones share one
/// projection and one serialization slot.
#[derive(Clone)]
pub struct CartSync {
    inner: Arc<CartSyncInner>,
}

struct CartSyncInner {
    orders: Arc<dyn OrderApi>,
    sessions: SessionManager,
    catalog: CatalogResolver,
    retry: RetryPolicy,
    /// The single local projection. `None` until the first fetch.
    projection: RwLock<Option<Cart>>,
    /// Fair mutex: mutating calls queue here in submission order.
    op_slot: Mutex<()>,
    /// Bumped when a clear is *submitted*. A queued mutation that observes a
    /// higher value than it saw at submission was superseded and is dropped.
    clear_requests: AtomicU64,
    /// Bumped when a clear is *confirmed*. A merge whose response arrived
    /// after a confirmed clear is discarded rather than resurrecting lines.
    clears_applied: AtomicU64,
    events: watch::Sender<CartEvent>,
}

impl CartSync {
    /// Create an engine over the given services.
    #[must_use]
    pub fn new(
        orders: Arc<dyn OrderApi>,
        sessions: SessionManager,
        catalog: CatalogResolver,
        retry: RetryPolicy,
    ) -> Self {
        let (events, _) = watch::channel(CartEvent {
            cart: Cart::empty(),
            outcome: Outcome::Idle,
        });
        Self {
            inner: Arc::new(CartSyncInner {
                orders,
                sessions,
                catalog,
                retry,
                projection: RwLock::new(None),
                op_slot: Mutex::new(()),
                clear_requests: AtomicU64::new(0),
                clears_applied: AtomicU64::new(0),
                events,
            }),
        }
    }

    /// Subscribe to published cart events.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartEvent> {
        self.inner.events.subscribe()
    }

    /// The current projection; fetched from the server on first call.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::BootstrapFailed`] when no session could be
    /// established, or the transport error from the initial fetch.
    #[instrument(skip(self))]
    pub async fn cart(&self) -> Result<Cart, ClientError> {
        if let Some(cart) = self.inner.projection.read().await.clone() {
            return Ok(cart);
        }
        let _slot = self.inner.op_slot.lock().await;
        // A queued fetch may have populated the projection while we waited.
        if let Some(cart) = self.inner.projection.read().await.clone() {
            return Ok(cart);
        }
        self.inner.sessions.ensure_session().await?;
        let orders = &self.inner.orders;
        match self.inner.retry.run(|| orders.fetch_cart()).await {
            Ok(snapshot) => {
                let cart = self.merge(snapshot).await;
                self.publish(cart.clone(), Outcome::Refreshed);
                Ok(cart)
            }
            Err(err) => {
                self.note_failure(&err).await;
                Err(err.into())
            }
        }
    }

    /// Add `quantity` of a catalog item. Repeated adds of the same item are
    /// merged into one line by the server.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidQuantity`] for a zero quantity without
    /// contacting the network, [`ClientError::BootstrapFailed`] when no
    /// session could be established, or the transport error.
    #[instrument(skip(self, customizations), fields(menu_item_id = %menu_item_id, quantity))]
    pub async fn add_item(
        &self,
        menu_item_id: MenuItemId,
        quantity: u32,
        customizations: CustomizationChoices,
    ) -> Result<Cart, ClientError> {
        if quantity == 0 {
            return Err(ClientError::InvalidQuantity);
        }
        let req = AddLineRequest {
            menu_item_id,
            quantity,
            customization_choices: customizations,
        };
        let orders = Arc::clone(&self.inner.orders);
        self.run_mutation(OpKind::Add, move || {
            let orders = Arc::clone(&orders);
            let req = req.clone();
            async move { orders.add_line(req).await }
        })
        .await
    }

    /// Change an existing line's quantity and, optionally, its
    /// customizations.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidQuantity`] for a zero quantity without
    /// contacting the network, [`ClientError::BootstrapFailed`] when no
    /// session could be established, or the transport error.
    #[instrument(skip(self, customizations), fields(line_id = %line_id, quantity))]
    pub async fn update_line(
        &self,
        line_id: LineId,
        quantity: u32,
        customizations: Option<CustomizationChoices>,
    ) -> Result<Cart, ClientError> {
        if quantity == 0 {
            return Err(ClientError::InvalidQuantity);
        }
        let req = UpdateLineRequest {
            quantity,
            customization_choices: customizations,
        };
        let orders = Arc::clone(&self.inner.orders);
        self.run_mutation(OpKind::UpdateQuantity, move || {
            let orders = Arc::clone(&orders);
            let req = req.clone();
            async move { orders.update_line(line_id, req).await }
        })
        .await
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::BootstrapFailed`] when no session could be
    /// established, or the transport error.
    #[instrument(skip(self), fields(line_id = %line_id))]
    pub async fn remove_line(&self, line_id: LineId) -> Result<Cart, ClientError> {
        let orders = Arc::clone(&self.inner.orders);
        self.run_mutation(OpKind::Remove, move || {
            let orders = Arc::clone(&orders);
            async move { orders.remove_line(line_id).await }
        })
        .await
    }

    /// Empty the cart. Always yields the empty invariant state, even when
    /// the server no longer recognizes some lines (treated as already
    /// cleared).
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::BootstrapFailed`] when no session could be
    /// established, or the transport error when the clear itself failed.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<Cart, ClientError> {
        // Submission marker: mutations queued ahead of us observe this and
        // drop rather than resurrect lines after the clear.
        self.inner.clear_requests.fetch_add(1, Ordering::SeqCst);
        let _slot = self.inner.op_slot.lock().await;

        let session = self.inner.sessions.ensure_session().await?;
        let op = PendingOperation::new(OpKind::Clear);
        let orders = &self.inner.orders;
        let result = self
            .inner
            .retry
            .run(|| {
                op.note_attempt();
                orders.clear_cart()
            })
            .await;

        match result {
            // A not-found means the server no longer knows some or all of
            // the lines: already cleared.
            Ok(()) | Err(ApiError::NotFound(_)) => {
                self.inner.clears_applied.fetch_add(1, Ordering::SeqCst);
                let cart = Cart {
                    user_id: Some(session.user_id),
                    ..Cart::empty()
                };
                *self.inner.projection.write().await = Some(cart.clone());
                info!(op_id = %op.id, attempts = op.attempts(), "cart cleared");
                self.publish(cart.clone(), Outcome::CartCleared);
                Ok(cart)
            }
            Err(err) => {
                self.note_failure(&err).await;
                warn!(op_id = %op.id, attempts = op.attempts(), error = %err, "clear failed");
                self.publish(self.projection_or_empty().await, Outcome::Failed(OpKind::Clear));
                Err(err.into())
            }
        }
    }

    /// Derived totals from the server, for display contexts that do not
    /// need the line list.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::BootstrapFailed`] when no session could be
    /// established, or the transport error.
    #[instrument(skip(self))]
    pub async fn totals(&self) -> Result<Totals, ClientError> {
        self.inner.sessions.ensure_session().await?;
        let orders = &self.inner.orders;
        match self.inner.retry.run(|| orders.fetch_totals()).await {
            Ok(totals) => Ok(totals),
            Err(err) => {
                self.note_failure(&err).await;
                Err(err.into())
            }
        }
    }

    /// Drop the local projection, e.g. on logout. The next read refetches
    /// under the new identity.
    pub async fn reset(&self) {
        *self.inner.projection.write().await = None;
        self.publish(Cart::empty(), Outcome::Refreshed);
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Serialized mutation path shared by add/update/remove.
    async fn run_mutation<F, Fut>(&self, kind: OpKind, mut call: F) -> Result<Cart, ClientError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<CartSnapshot, ApiError>> + Send,
    {
        let clear_mark = self.inner.clear_requests.load(Ordering::SeqCst);
        let _slot = self.inner.op_slot.lock().await;

        // A clear submitted after us must not have its effect undone by a
        // mutation that was still queued when it arrived.
        if self.inner.clear_requests.load(Ordering::SeqCst) > clear_mark {
            debug!(%kind, "queued mutation superseded by a later clear");
            let cart = self.projection_or_empty().await;
            self.publish(cart.clone(), Outcome::Superseded);
            return Ok(cart);
        }

        self.inner.sessions.ensure_session().await?;

        let op = PendingOperation::new(kind);
        let epoch = self.inner.clears_applied.load(Ordering::SeqCst);
        let result = self
            .inner
            .retry
            .run(|| {
                op.note_attempt();
                call()
            })
            .await;

        match result {
            Ok(snapshot) => {
                if self.inner.clears_applied.load(Ordering::SeqCst) != epoch {
                    // A clear was confirmed while this response was in
                    // flight; merging it would resurrect cleared lines.
                    debug!(op_id = %op.id, kind = %op.kind, "discarding response confirmed after a clear");
                    let cart = self.projection_or_empty().await;
                    self.publish(cart.clone(), Outcome::Superseded);
                    return Ok(cart);
                }
                let cart = self.merge(snapshot).await;
                info!(op_id = %op.id, kind = %op.kind, attempts = op.attempts(), "cart mutation confirmed");
                let outcome = match kind {
                    OpKind::Add => Outcome::ItemAdded,
                    OpKind::UpdateQuantity => Outcome::CartUpdated,
                    OpKind::Remove => Outcome::ItemRemoved,
                    OpKind::Clear => Outcome::CartCleared,
                };
                self.publish(cart.clone(), outcome);
                Ok(cart)
            }
            Err(err) => {
                self.note_failure(&err).await;
                warn!(op_id = %op.id, kind = %op.kind, attempts = op.attempts(), error = %err, "cart mutation failed");
                self.publish(self.projection_or_empty().await, Outcome::Failed(kind));
                Err(err.into())
            }
        }
    }

    /// Replace the projection wholesale with the server's snapshot, then
    /// enrich and reconcile.
    async fn merge(&self, snapshot: CartSnapshot) -> Cart {
        let mut lines = snapshot.lines;
        self.inner.catalog.enrich_all(&mut lines).await;
        let totals = pricing::reconcile(&lines);
        let cart = Cart {
            id: Some(snapshot.id),
            user_id: Some(snapshot.user_id),
            lines,
            totals,
            updated_at: snapshot.updated_at,
        };
        *self.inner.projection.write().await = Some(cart.clone());
        cart
    }

    /// An auth-rejected response invalidates the session; the next
    /// operation re-bootstraps instead of silently retrying with stale
    /// credentials.
    async fn note_failure(&self, err: &ApiError) {
        if matches!(err, ApiError::AuthExpired) {
            self.inner.sessions.invalidate().await;
        }
    }

    async fn projection_or_empty(&self) -> Cart {
        self.inner
            .projection
            .read()
            .await
            .clone()
            .unwrap_or_else(Cart::empty)
    }

    fn publish(&self, cart: Cart, outcome: Outcome) {
        self.inner.events.send_replace(CartEvent { cart, outcome });
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::AtomicI32;

    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use secrecy::SecretString;
    use tableside_core::{CartId, CategoryId, UserId};
    use tokio::sync::Notify;

    use super::*;
    use crate::api::{AuthApi, CatalogApi};
    use crate::session::{IdentityKind, MemoryTokenStore, Session};
    use crate::types::{CartLine, Category, MenuItem};

    // ========================================================================
    // Doubles
    // ========================================================================

    enum FailKind {
        Server,
        AuthExpired,
        NotFound,
    }

    impl FailKind {
        fn to_error(&self) -> ApiError {
            match self {
                Self::Server => ApiError::Server {
                    status: 503,
                    message: "unavailable".to_string(),
                },
                Self::AuthExpired => ApiError::AuthExpired,
                Self::NotFound => ApiError::NotFound("cart line".to_string()),
            }
        }
    }

    struct FailPlan {
        kind: FailKind,
        remaining: u32,
    }

    #[derive(Clone)]
    struct ServerLine {
        line_id: i32,
        menu_item_id: i32,
        quantity: u32,
        unit_price: Decimal,
        customizations: CustomizationChoices,
    }

    /// In-process stand-in for the order service. Keeps authoritative line
    /// state, merges repeated adds of the same catalog item, and can be told
    /// to fail or stall.
    struct FakeOrders {
        prices: HashMap<i32, Decimal>,
        state: StdMutex<Vec<ServerLine>>,
        next_line_id: AtomicI32,
        add_calls: AtomicU32,
        update_calls: AtomicU32,
        remove_calls: AtomicU32,
        clear_calls: AtomicU32,
        fetch_calls: AtomicU32,
        fail_plan: StdMutex<Option<FailPlan>>,
        /// When set, `add_line` signals `entered` then waits for `release`.
        gate: Option<(Arc<Notify>, Arc<Notify>)>,
    }

    impl FakeOrders {
        fn with_prices(prices: &[(i32, &str)]) -> Self {
            Self {
                prices: prices
                    .iter()
                    .map(|&(id, price)| (id, price.parse().expect("decimal")))
                    .collect(),
                state: StdMutex::new(Vec::new()),
                next_line_id: AtomicI32::new(1),
                add_calls: AtomicU32::new(0),
                update_calls: AtomicU32::new(0),
                remove_calls: AtomicU32::new(0),
                clear_calls: AtomicU32::new(0),
                fetch_calls: AtomicU32::new(0),
                fail_plan: StdMutex::new(None),
                gate: None,
            }
        }

        fn fail_next(&self, kind: FailKind, times: u32) {
            *self.fail_plan.lock().expect("fail plan lock") = Some(FailPlan {
                kind,
                remaining: times,
            });
        }

        fn take_failure(&self) -> Option<ApiError> {
            let mut plan = self.fail_plan.lock().expect("fail plan lock");
            match plan.as_mut() {
                Some(p) if p.remaining > 0 => {
                    p.remaining -= 1;
                    let err = p.kind.to_error();
                    if p.remaining == 0 {
                        *plan = None;
                    }
                    Some(err)
                }
                _ => None,
            }
        }

        fn snapshot(&self) -> CartSnapshot {
            let state = self.state.lock().expect("state lock");
            CartSnapshot {
                id: CartId::new(1),
                user_id: UserId::new(7),
                lines: state
                    .iter()
                    .map(|line| CartLine {
                        id: LineId::new(line.line_id),
                        menu_item_id: MenuItemId::new(line.menu_item_id),
                        quantity: line.quantity,
                        customizations: line.customizations.clone(),
                        unit_price: line.unit_price,
                        subtotal: pricing::line_subtotal(line.unit_price, line.quantity),
                        display: None,
                    })
                    .collect(),
                updated_at: Some(Utc::now()),
            }
        }
    }

    #[async_trait]
    impl OrderApi for FakeOrders {
        async fn fetch_cart(&self) -> Result<CartSnapshot, ApiError> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = self.take_failure() {
                return Err(err);
            }
            Ok(self.snapshot())
        }

        async fn add_line(&self, req: AddLineRequest) -> Result<CartSnapshot, ApiError> {
            self.add_calls.fetch_add(1, Ordering::SeqCst);
            if let Some((entered, release)) = &self.gate {
                entered.notify_one();
                release.notified().await;
            }
            if let Some(err) = self.take_failure() {
                return Err(err);
            }
            let menu_item_id = req.menu_item_id.as_i32();
            let unit_price = *self
                .prices
                .get(&menu_item_id)
                .ok_or_else(|| ApiError::NotFound(format!("menu item {menu_item_id}")))?;
            let mut state = self.state.lock().expect("state lock");
            // Repeated adds of the same catalog item merge into one line.
            if let Some(line) = state.iter_mut().find(|l| l.menu_item_id == menu_item_id) {
                line.quantity += req.quantity;
            } else {
                state.push(ServerLine {
                    line_id: self.next_line_id.fetch_add(1, Ordering::SeqCst),
                    menu_item_id,
                    quantity: req.quantity,
                    unit_price,
                    customizations: req.customization_choices,
                });
            }
            drop(state);
            Ok(self.snapshot())
        }

        async fn update_line(
            &self,
            line_id: LineId,
            req: UpdateLineRequest,
        ) -> Result<CartSnapshot, ApiError> {
            self.update_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = self.take_failure() {
                return Err(err);
            }
            let id = line_id.as_i32();
            let mut state = self.state.lock().expect("state lock");
            let line = state
                .iter_mut()
                .find(|l| l.line_id == id)
                .ok_or_else(|| ApiError::NotFound(format!("cart line {id}")))?;
            line.quantity = req.quantity;
            if let Some(customizations) = req.customization_choices {
                line.customizations = customizations;
            }
            drop(state);
            Ok(self.snapshot())
        }

        async fn remove_line(&self, line_id: LineId) -> Result<CartSnapshot, ApiError> {
            self.remove_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = self.take_failure() {
                return Err(err);
            }
            let id = line_id.as_i32();
            self.state
                .lock()
                .expect("state lock")
                .retain(|l| l.line_id != id);
            Ok(self.snapshot())
        }

        async fn clear_cart(&self) -> Result<(), ApiError> {
            self.clear_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = self.take_failure() {
                return Err(err);
            }
            self.state.lock().expect("state lock").clear();
            Ok(())
        }

        async fn fetch_totals(&self) -> Result<Totals, ApiError> {
            if let Some(err) = self.take_failure() {
                return Err(err);
            }
            let snapshot = self.snapshot();
            Ok(pricing::reconcile(&snapshot.lines))
        }
    }

    #[derive(Default)]
    struct FakeAuth {
        guest_calls: AtomicU32,
    }

    #[async_trait]
    impl AuthApi for FakeAuth {
        async fn guest_login(&self) -> Result<Session, ApiError> {
            self.guest_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Session {
                user_id: UserId::new(7),
                identity: IdentityKind::Anonymous,
                token: SecretString::from("guest-token".to_string()),
            })
        }

        async fn login(
            &self,
            _email: &tableside_core::Email,
            _password: &SecretString,
        ) -> Result<Session, ApiError> {
            Ok(Session {
                user_id: UserId::new(7),
                identity: IdentityKind::Authenticated,
                token: SecretString::from("user-token".to_string()),
            })
        }

        async fn current_user(&self, _token: &SecretString) -> Result<Session, ApiError> {
            Err(ApiError::AuthExpired)
        }

        async fn adopt_token(&self, _token: &SecretString) {}
        async fn revoke_token(&self) {}
    }

    struct FakeCatalog {
        items: Vec<MenuItem>,
    }

    #[async_trait]
    impl CatalogApi for FakeCatalog {
        async fn list_items(&self) -> Result<Vec<MenuItem>, ApiError> {
            Ok(self.items.clone())
        }

        async fn get_item(&self, id: MenuItemId) -> Result<MenuItem, ApiError> {
            self.items
                .iter()
                .find(|item| item.id == id)
                .cloned()
                .ok_or_else(|| ApiError::NotFound(format!("menu item {id}")))
        }

        async fn list_categories(&self) -> Result<Vec<Category>, ApiError> {
            Ok(Vec::new())
        }
    }

    fn menu_item(id: i32, name: &str, price: &str) -> MenuItem {
        MenuItem {
            id: MenuItemId::new(id),
            category_id: CategoryId::new(1),
            name: name.to_string(),
            description: String::new(),
            price: price.parse().expect("decimal"),
            image_url: None,
            customization_options: std::collections::BTreeMap::new(),
            is_active: true,
            is_vegetarian: false,
            is_vegan: false,
            is_gluten_free: false,
            spice_level: 0,
            average_rating: 0.0,
            rating_count: 0,
        }
    }

    struct Harness {
        engine: CartSync,
        orders: Arc<FakeOrders>,
        auth: Arc<FakeAuth>,
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn harness_with(orders: FakeOrders, items: Vec<MenuItem>) -> Harness {
        init_tracing();
        let orders = Arc::new(orders);
        let auth = Arc::new(FakeAuth::default());
        let retry = RetryPolicy::default();
        let sessions = SessionManager::new(
            Arc::clone(&auth) as Arc<dyn AuthApi>,
            Arc::new(MemoryTokenStore::default()),
            retry,
        );
        let catalog = CatalogResolver::new(Arc::new(FakeCatalog { items }), retry);
        let engine = CartSync::new(
            Arc::clone(&orders) as Arc<dyn OrderApi>,
            sessions,
            catalog,
            retry,
        );
        Harness {
            engine,
            orders,
            auth,
        }
    }

    fn harness(prices: &[(i32, &str)]) -> Harness {
        let items = prices
            .iter()
            .enumerate()
            .map(|(idx, &(id, price))| menu_item(id, &format!("Item {idx}"), price))
            .collect();
        harness_with(FakeOrders::with_prices(prices), items)
    }

    fn dec(s: &str) -> Decimal {
        s.parse().expect("decimal")
    }

    fn assert_invariants(cart: &Cart) {
        let expected_subtotal: Decimal = cart.lines.iter().map(|line| line.subtotal).sum();
        assert_eq!(cart.totals.subtotal, pricing::round_money(expected_subtotal));
        assert_eq!(
            cart.totals.tax,
            pricing::round_money(cart.totals.subtotal * pricing::TAX_RATE)
        );
        assert_eq!(cart.totals.total, cart.totals.subtotal + cart.totals.tax);
        for line in &cart.lines {
            assert_eq!(
                line.subtotal,
                pricing::line_subtotal(line.unit_price, line.quantity)
            );
        }
    }

    // ========================================================================
    // Tests
    // ========================================================================

    #[tokio::test]
    async fn add_then_merge_same_item_keeps_totals_consistent() {
        let h = harness(&[(1, "10.00")]);

        let cart = h
            .engine
            .add_item(MenuItemId::new(1), 1, CustomizationChoices::new())
            .await
            .expect("first add");
        assert_eq!(cart.lines.len(), 1);
        assert_eq!(cart.totals.subtotal, dec("10.00"));
        assert_eq!(cart.totals.tax, dec("0.80"));
        assert_eq!(cart.totals.total, dec("10.80"));

        let cart = h
            .engine
            .add_item(MenuItemId::new(1), 2, CustomizationChoices::new())
            .await
            .expect("merged add");
        assert_eq!(cart.lines.len(), 1, "same item merges into one line");
        assert_eq!(cart.lines[0].quantity, 3);
        assert_eq!(cart.totals.subtotal, dec("30.00"));
        assert_eq!(cart.totals.tax, dec("2.40"));
        assert_eq!(cart.totals.total, dec("32.40"));
        assert_invariants(&cart);
    }

    #[tokio::test]
    async fn tax_is_rounded_once_on_the_aggregate() {
        let h = harness(&[(1, "10.25"), (2, "15.25")]);

        h.engine
            .add_item(MenuItemId::new(1), 1, CustomizationChoices::new())
            .await
            .expect("add first");
        let cart = h
            .engine
            .add_item(MenuItemId::new(2), 1, CustomizationChoices::new())
            .await
            .expect("add second");

        assert_eq!(cart.lines.len(), 2);
        assert_eq!(cart.totals.subtotal, dec("25.50"));
        assert_eq!(cart.totals.tax, dec("2.04"));
        assert_eq!(cart.totals.total, dec("27.54"));
    }

    #[tokio::test]
    async fn zero_quantity_is_rejected_before_any_network_call() {
        let h = harness(&[(1, "10.00")]);

        let add_err = h
            .engine
            .add_item(MenuItemId::new(1), 0, CustomizationChoices::new())
            .await
            .expect_err("zero add");
        assert!(matches!(add_err, ClientError::InvalidQuantity));

        let update_err = h
            .engine
            .update_line(LineId::new(1), 0, None)
            .await
            .expect_err("zero update");
        assert!(matches!(update_err, ClientError::InvalidQuantity));

        assert_eq!(h.orders.add_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.orders.update_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.auth.guest_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_mutation_leaves_projection_untouched() {
        let h = harness(&[(1, "10.00"), (2, "5.00")]);

        let before = h
            .engine
            .add_item(MenuItemId::new(1), 2, CustomizationChoices::new())
            .await
            .expect("seed cart");

        // Exhaust all retry attempts.
        h.orders.fail_next(FailKind::Server, u32::MAX);
        let err = h
            .engine
            .add_item(MenuItemId::new(2), 1, CustomizationChoices::new())
            .await
            .expect_err("exhausted retries");
        assert!(matches!(err, ClientError::Api(ApiError::Server { .. })));

        let after = h.engine.cart().await.expect("projection read");
        assert_eq!(after, before, "failed mutation must not change the cart");
    }

    #[tokio::test]
    async fn auth_expired_invalidates_session_without_silent_replay() {
        let h = harness(&[(1, "10.00")]);

        h.engine
            .add_item(MenuItemId::new(1), 1, CustomizationChoices::new())
            .await
            .expect("seed session");
        assert_eq!(h.auth.guest_calls.load(Ordering::SeqCst), 1);

        h.orders.fail_next(FailKind::AuthExpired, 1);
        let err = h
            .engine
            .add_item(MenuItemId::new(1), 1, CustomizationChoices::new())
            .await
            .expect_err("rejected credentials");
        assert!(err.is_auth_rejected());
        // Surfaced after exactly one transport attempt, no auto-replay.
        assert_eq!(h.orders.add_calls.load(Ordering::SeqCst), 2);

        // The next operation re-bootstraps exactly once.
        h.engine
            .add_item(MenuItemId::new(1), 1, CustomizationChoices::new())
            .await
            .expect("fresh session");
        assert_eq!(h.auth.guest_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn clear_yields_empty_state_even_on_unknown_lines() {
        let h = harness(&[(1, "10.00")]);

        h.engine
            .add_item(MenuItemId::new(1), 3, CustomizationChoices::new())
            .await
            .expect("seed cart");

        // Server answers the clear with a not-found for lines it no longer
        // recognizes.
        h.orders.fail_next(FailKind::NotFound, 1);
        let cart = h.engine.clear().await.expect("clear");

        assert!(cart.is_empty());
        assert_eq!(cart.totals, Totals::default());
        assert_eq!(cart.totals.total, Decimal::ZERO);
    }

    #[tokio::test]
    async fn transient_add_failure_is_retried_to_success() {
        let h = harness(&[(1, "12.50")]);

        h.orders.fail_next(FailKind::Server, 2);
        let cart = h
            .engine
            .add_item(MenuItemId::new(1), 1, CustomizationChoices::new())
            .await
            .expect("third attempt succeeds");

        assert_eq!(h.orders.add_calls.load(Ordering::SeqCst), 3);
        assert_eq!(cart.totals.subtotal, dec("12.50"));
    }

    #[tokio::test]
    async fn first_cart_read_bootstraps_and_fetches_once() {
        let h = harness(&[(1, "10.00")]);

        let first = h.engine.cart().await.expect("initial fetch");
        assert!(first.is_empty());
        let _second = h.engine.cart().await.expect("cached projection");

        assert_eq!(h.auth.guest_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.orders.fetch_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn auth_expired_on_initial_fetch_invalidates_session() {
        let h = harness(&[(1, "10.00")]);

        h.orders.fail_next(FailKind::AuthExpired, 1);
        let err = h.engine.cart().await.expect_err("rejected fetch");
        assert!(err.is_auth_rejected());

        // The next read re-bootstraps with fresh credentials instead of
        // failing forever on the stale session.
        let cart = h.engine.cart().await.expect("fresh session");
        assert!(cart.is_empty());
        assert_eq!(h.auth.guest_calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.orders.fetch_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn events_publish_outcome_with_projection() {
        let h = harness(&[(1, "10.00")]);
        let mut events = h.engine.subscribe();
        assert_eq!(events.borrow().outcome, Outcome::Idle);

        let cart = h
            .engine
            .add_item(MenuItemId::new(1), 1, CustomizationChoices::new())
            .await
            .expect("add");

        events.changed().await.expect("event published");
        let event = events.borrow_and_update().clone();
        assert_eq!(event.outcome, Outcome::ItemAdded);
        assert_eq!(event.cart, cart);
        assert_eq!(event.outcome.to_string(), "Item added to cart");
    }

    #[tokio::test]
    async fn failed_mutation_publishes_failure_outcome() {
        let h = harness(&[(1, "10.00")]);
        let events = h.engine.subscribe();

        h.orders.fail_next(FailKind::AuthExpired, 1);
        h.engine
            .add_item(MenuItemId::new(1), 1, CustomizationChoices::new())
            .await
            .expect_err("rejected");

        let event = events.borrow().clone();
        assert_eq!(event.outcome, Outcome::Failed(OpKind::Add));
        assert_eq!(event.outcome.to_string(), "Failed to add item to cart");
        assert!(event.cart.is_empty(), "no projection existed to keep");
    }

    #[tokio::test]
    async fn enrichment_overlays_catalog_names_onto_lines() {
        let h = harness(&[(1, "10.00")]);

        let cart = h
            .engine
            .add_item(MenuItemId::new(1), 1, CustomizationChoices::new())
            .await
            .expect("add");

        let display = cart.lines[0].display.as_ref().expect("display overlay");
        assert_eq!(display.name, "Item 0");
    }

    #[tokio::test]
    async fn update_and_remove_flow_keeps_invariants() {
        let h = harness(&[(1, "4.15"), (2, "8.95")]);

        h.engine
            .add_item(MenuItemId::new(1), 2, CustomizationChoices::new())
            .await
            .expect("add first");
        let cart = h
            .engine
            .add_item(MenuItemId::new(2), 1, CustomizationChoices::new())
            .await
            .expect("add second");
        assert_invariants(&cart);
        let first_line = cart.lines[0].id;

        let cart = h
            .engine
            .update_line(first_line, 5, None)
            .await
            .expect("update");
        assert_eq!(cart.lines[0].quantity, 5);
        assert_invariants(&cart);

        let cart = h.engine.remove_line(first_line).await.expect("remove");
        assert_eq!(cart.lines.len(), 1);
        assert_invariants(&cart);
    }

    #[tokio::test]
    async fn queued_mutation_is_dropped_by_a_later_clear() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let mut orders = FakeOrders::with_prices(&[(1, "10.00"), (2, "5.00")]);
        orders.gate = Some((Arc::clone(&entered), Arc::clone(&release)));
        let h = harness_with(orders, vec![menu_item(1, "Item 0", "10.00")]);

        // First add holds the in-flight slot inside the stalled transport
        // call.
        let engine_a = h.engine.clone();
        let in_flight = tokio::spawn(async move {
            engine_a
                .add_item(MenuItemId::new(1), 1, CustomizationChoices::new())
                .await
        });
        entered.notified().await;

        // Second add queues behind it.
        let engine_b = h.engine.clone();
        let queued = tokio::spawn(async move {
            engine_b
                .add_item(MenuItemId::new(2), 1, CustomizationChoices::new())
                .await
        });
        tokio::task::yield_now().await;

        // A clear submitted while the second add is still queued supersedes
        // it.
        let engine_c = h.engine.clone();
        let clearing = tokio::spawn(async move { engine_c.clear().await });
        tokio::task::yield_now().await;

        release.notify_one();
        let in_flight_cart = in_flight
            .await
            .expect("join")
            .expect("in-flight add completes");
        assert_eq!(in_flight_cart.lines.len(), 1);

        let queued_cart = queued.await.expect("join").expect("queued add resolves");
        let cleared_cart = clearing.await.expect("join").expect("clear succeeds");

        // The queued add never reached the transport.
        assert_eq!(h.orders.add_calls.load(Ordering::SeqCst), 1);
        assert!(cleared_cart.is_empty());
        assert!(
            queued_cart.lines.len() <= 1,
            "superseded op returns a projection, never applies its change"
        );
        let final_cart = h.engine.cart().await.expect("final projection");
        assert!(final_cart.is_empty());
        assert_eq!(final_cart.totals.total, Decimal::ZERO);
    }

    #[tokio::test]
    async fn totals_endpoint_matches_reconciled_projection() {
        let h = harness(&[(1, "10.25"), (2, "15.25")]);

        h.engine
            .add_item(MenuItemId::new(1), 1, CustomizationChoices::new())
            .await
            .expect("add first");
        let cart = h
            .engine
            .add_item(MenuItemId::new(2), 1, CustomizationChoices::new())
            .await
            .expect("add second");

        let totals = h.engine.totals().await.expect("totals fetch");
        assert_eq!(totals, cart.totals);
    }

    #[tokio::test]
    async fn reset_drops_the_projection() {
        let h = harness(&[(1, "10.00")]);

        let before = h
            .engine
            .add_item(MenuItemId::new(1), 1, CustomizationChoices::new())
            .await
            .expect("seed cart");
        assert_eq!(h.orders.fetch_calls.load(Ordering::SeqCst), 0);
        h.engine.reset().await;

        // The next read refetches the authoritative state from the server,
        // which still holds the confirmed line.
        let cart = h.engine.cart().await.expect("refetched");
        assert_eq!(h.orders.fetch_calls.load(Ordering::SeqCst), 1);
        assert_eq!(cart.lines, before.lines);
        assert_eq!(cart.totals, before.totals);
    }
}
