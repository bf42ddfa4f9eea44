//! Session facade wiring Gate, checkout and cache together.
//!
//! The payment webhook lands independently of the browser redirect, so on
//! return from checkout the durable store may not show the purchase yet. The
//! storefront keeps the single just-purchased product open for a bounded
//! number of reloads. It is dropped once the server confirms it, once that
//! budget runs out (the payment was never recorded), or on sign-out.

use crate::cache::EntitlementCache;
use crate::client::{StoreBackend, StoreClient};
use crate::error::{Result, StoreError};
use crate::gate::{self, Access};
use crate::types::{CheckoutRequest, CheckoutResult, Product};

/// Outcome of asking for a product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessOutcome {
    Open,
    /// Redirect the user to `url`.
    Checkout(CheckoutResult),
}

/// Reloads that may omit the optimistic product before it is revoked.
pub const DEFAULT_PENDING_RELOADS: u32 = 3;

/// State of the optimistic entry after a reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Nothing was pending.
    Idle,
    /// The durable store now shows the purchase.
    Confirmed,
    /// Not durable yet; the optimistic entry stays in the cache.
    Pending,
    /// Never became durable within the reload budget; access was revoked.
    Expired,
}

/// The single product unlocked ahead of the durable write.
#[derive(Debug, Clone)]
struct Optimistic {
    key: String,
    /// Reloads so far that did not show it.
    misses: u32,
}

#[derive(Debug)]
pub struct Storefront<B = StoreClient> {
    backend: B,
    cache: EntitlementCache,
    optimistic: Option<Optimistic>,
    pending_reloads: u32,
    success_url: Option<String>,
    cancel_url: Option<String>,
}

impl<B: StoreBackend> Storefront<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            cache: EntitlementCache::new(),
            optimistic: None,
            pending_reloads: DEFAULT_PENDING_RELOADS,
            success_url: None,
            cancel_url: None,
        }
    }

    /// How many reloads may omit a just-purchased product before it is revoked.
    pub fn with_pending_reloads(mut self, reloads: u32) -> Self {
        self.pending_reloads = reloads;
        self
    }

    /// Where the processor sends the user back (must be on the store's origin).
    pub fn with_redirects(mut self, success_url: Option<String>, cancel_url: Option<String>) -> Self {
        self.success_url = success_url;
        self.cancel_url = cancel_url;
        self
    }

    /// Start a session: set the token and load the user's entitlements.
    ///
    /// The session is established even if the load fails; call `refresh` later.
    /// Signing in again as the same user (token refresh) reconciles a pending
    /// purchase like `refresh` does.
    pub async fn sign_in(&mut self, user_id: &str, access_token: &str) -> Result<()> {
        if self.cache.owner() != Some(user_id) {
            self.optimistic = None;
        }
        self.backend.set_access_token(Some(access_token.to_string()));
        self.cache.load(&self.backend, user_id).await?;
        self.reconcile();
        Ok(())
    }

    pub fn sign_out(&mut self) {
        self.backend.set_access_token(None);
        self.cache.clear();
        self.optimistic = None;
    }

    /// Gate decision from the cache alone.
    pub fn access(&self, product: &Product) -> Access {
        gate::decide(product, &self.cache)
    }

    /// Open the product, or start a checkout for it.
    pub async fn request_access(&self, product: &Product) -> Result<AccessOutcome> {
        if self.access(product) == Access::Open {
            return Ok(AccessOutcome::Open);
        }
        if self.cache.owner().is_none() {
            return Err(StoreError::no_session());
        }
        let price_ref = product
            .price_ref()
            .ok_or_else(|| StoreError::validation("Product has no price reference"))?;

        let result = self
            .backend
            .create_checkout(&CheckoutRequest {
                price_ref: price_ref.to_string(),
                mode: product.checkout_mode(),
                success_url: self.success_url.clone(),
                cancel_url: self.cancel_url.clone(),
            })
            .await?;
        tracing::debug!("Checkout {} started for {}", result.session_id, product.key());
        Ok(AccessOutcome::Checkout(result))
    }

    /// The processor reported success to the client: unlock now.
    ///
    /// Only one optimistic entry exists at a time; an unconfirmed earlier one
    /// is dropped.
    pub fn checkout_completed(&mut self, product: &Product) {
        let key = product.key();
        if let Some(previous) = self.optimistic.take()
            && previous.key != key
        {
            self.cache.remove(&previous.key);
        }
        self.cache.add(&key);
        self.optimistic = Some(Optimistic { key, misses: 0 });
    }

    /// Back from the processor's redirect: reload and reconcile.
    ///
    /// A failed reload leaves the cache, optimistic entry included, untouched.
    pub async fn returned_from_checkout(&mut self) -> Result<Reconciliation> {
        self.refresh().await
    }

    /// Reload from the durable store and reconcile the optimistic entry.
    pub async fn refresh(&mut self) -> Result<Reconciliation> {
        let user_id = self
            .cache
            .owner()
            .map(str::to_string)
            .ok_or_else(StoreError::no_session)?;
        self.cache.load(&self.backend, &user_id).await?;
        Ok(self.reconcile())
    }

    /// Runs after every successful load, which has replaced the set wholesale.
    fn reconcile(&mut self) -> Reconciliation {
        let Some(pending) = self.optimistic.as_mut() else {
            return Reconciliation::Idle;
        };
        if self.cache.has(&pending.key) {
            tracing::info!("Purchase of {} confirmed", pending.key);
            self.optimistic = None;
            return Reconciliation::Confirmed;
        }

        pending.misses += 1;
        if pending.misses > self.pending_reloads {
            tracing::warn!(
                "Purchase of {} not recorded after {} reloads, revoking",
                pending.key,
                pending.misses
            );
            self.optimistic = None;
            return Reconciliation::Expired;
        }

        tracing::debug!(
            "Purchase of {} not durable yet ({}/{})",
            pending.key,
            pending.misses,
            self.pending_reloads
        );
        let key = pending.key.clone();
        self.cache.add(&key);
        Reconciliation::Pending
    }

    /// Durable ownership check for paid content on a fresh session.
    /// A positive answer is folded into the cache.
    pub async fn verify_owned(&mut self, app_id: &str) -> Result<bool> {
        if self.cache.owner().is_none() {
            return Err(StoreError::no_session());
        }
        let owned = self.backend.check_owned(app_id).await?;
        if owned {
            self.cache.add(app_id);
        }
        Ok(owned)
    }

    pub fn cache(&self) -> &EntitlementCache {
        &self.cache
    }

    pub fn pending_purchase(&self) -> Option<&str> {
        self.optimistic.as_ref().map(|pending| pending.key.as_str())
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}
