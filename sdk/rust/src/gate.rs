//! Access decision for a product. Pure: no I/O, no mutation.

use crate::cache::EntitlementCache;
use crate::types::Product;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Open,
    RequirePayment,
}

/// Free products are always open; anything else needs a cache hit.
///
/// A miss is not proof of non-ownership (the cache may lag the server). Use
/// `Storefront::verify_owned` when precision matters.
pub fn decide(product: &Product, cache: &EntitlementCache) -> Access {
    if product.is_free() || cache.has(&product.key()) {
        Access::Open
    } else {
        Access::RequirePayment
    }
}
