//! Session-scoped entitlement cache.
//!
//! Holds the product keys the signed-in user is known to own. The set is a
//! conservative subset of the durable truth: it is replaced wholesale on
//! every load and only ever runs ahead of the server by an optimistic `add`.

use std::collections::HashSet;
use std::future::Future;

use crate::error::{Result, StoreError};
use crate::types::EntitlementSnapshot;

/// Where `EntitlementCache::load` reads durable entitlements from.
pub trait EntitlementSource {
    fn fetch_entitlements(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<EntitlementSnapshot>> + Send;
}

#[derive(Debug, Default)]
pub struct EntitlementCache {
    owner: Option<String>,
    products: HashSet<String>,
}

impl EntitlementCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the set with the user's durable entitlements.
    ///
    /// Switching users empties the set before the read, so a failed load
    /// never leaves the previous user's products visible. On failure the set
    /// is otherwise left as it was and the error is returned for a later retry.
    pub async fn load<S: EntitlementSource>(&mut self, source: &S, user_id: &str) -> Result<usize> {
        if self.owner.as_deref() != Some(user_id) {
            if self.owner.is_some() {
                tracing::debug!("Entitlement cache switching user, clearing");
            }
            self.products.clear();
            self.owner = Some(user_id.to_string());
        }

        let snapshot = match source.fetch_entitlements(user_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("Failed to load entitlements for {}: {}", user_id, e);
                return Err(e);
            }
        };

        if snapshot.user_id != user_id {
            tracing::warn!(
                "Entitlements returned for {} while loading {}, ignoring",
                snapshot.user_id,
                user_id
            );
            return Err(StoreError::invalid_response(
                "Entitlements belong to a different user",
            ));
        }

        let now = chrono::Utc::now().timestamp();
        self.products = snapshot.product_keys(now).into_iter().collect();
        tracing::debug!("Loaded {} entitlements for {}", self.products.len(), user_id);
        Ok(self.products.len())
    }

    pub fn has(&self, product_key: &str) -> bool {
        self.products.contains(product_key)
    }

    /// Record a purchase the client just saw succeed, ahead of the durable write.
    pub fn add(&mut self, product_key: &str) {
        if self.products.insert(product_key.to_string()) {
            tracing::info!("Optimistically granted {}", product_key);
        }
    }

    /// Drop an optimistic entry that was never confirmed.
    pub fn remove(&mut self, product_key: &str) -> bool {
        self.products.remove(product_key)
    }

    /// Sign-out: forget both the products and the owner.
    pub fn clear(&mut self) {
        self.products.clear();
        self.owner = None;
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}
