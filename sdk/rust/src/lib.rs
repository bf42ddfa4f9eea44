//! # Vibe Store SDK
//!
//! Client side of Vibe Store purchases: a session-scoped entitlement cache,
//! the access gate, and a client for the store server.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vibe_store_sdk::{AccessOutcome, Reconciliation, StoreClient, Storefront};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = StoreClient::new("https://store.example.com")?;
//!     let mut store = Storefront::new(client);
//!
//!     // Loads the user's entitlements once per session
//!     store.sign_in("user-id", "access-token").await?;
//!
//!     let product = vibe_store_sdk::Product::App(
//!         store.backend().app("vs_app_0123456789abcdef0123456789abcdef").await?,
//!     );
//!     match store.request_access(&product).await? {
//!         AccessOutcome::Open => println!("Enjoy!"),
//!         AccessOutcome::Checkout(checkout) => println!("Pay at {}", checkout.url),
//!     }
//!
//!     // After the processor redirects back with success:
//!     store.checkout_completed(&product);
//!     if store.returned_from_checkout().await? == Reconciliation::Pending {
//!         println!("Payment is being confirmed");
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Consistency
//!
//! - The cache is replaced wholesale on every load and cleared on sign-out or
//!   user switch, so entitlements never leak between users.
//! - A cache miss is not proof of non-ownership; use
//!   `Storefront::verify_owned` before gating paid content on a fresh session.
//! - The purchase webhook may land after the redirect back; the just-bought
//!   product stays open until a reload confirms it, for at most
//!   `DEFAULT_PENDING_RELOADS` reloads (see `Storefront::with_pending_reloads`).

pub mod cache;
pub mod client;
pub mod error;
pub mod gate;
pub mod storefront;
pub mod types;

pub use cache::{EntitlementCache, EntitlementSource};
pub use client::{DEFAULT_TIMEOUT, StoreBackend, StoreClient};
pub use error::{Result, StoreError, StoreErrorCode};
pub use gate::{Access, decide};
pub use storefront::{AccessOutcome, DEFAULT_PENDING_RELOADS, Reconciliation, Storefront};
pub use types::{
    AppProduct, CheckoutMode, CheckoutRequest, CheckoutResult, EntitlementSnapshot, Ownership,
    PLAN_KEY_PREFIX, PlanProduct, PlanTier, PricingType, Product, SubscriptionTier,
};
