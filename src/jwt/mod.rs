//! Access-token handling for storefront users.
//!
//! Users authenticate with the hosted auth provider, which issues HS256 JWTs
//! signed with the project's JWT secret. The server only verifies them; the
//! signing half exists for dev seeding and tests.

mod claims;
mod signing;

pub use claims::*;
pub use signing::*;
