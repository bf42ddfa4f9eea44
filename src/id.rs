//! Prefixed ID generation for Vibe Store entities.
//!
//! All IDs use a `vs_` brand prefix so they can never collide with payment
//! processor IDs (Stripe's `cs_`, `cus_`, `sub_`, etc.) in logs or metadata.
//!
//! Format: `vs_{entity}_{uuid_simple}` (32 hex chars, no hyphens)
//!
//! Profiles are keyed by the auth provider's user ID and are not generated here.

use uuid::Uuid;

const ALL_PREFIXES: &[&str] = &["vs_app_", "vs_txn_", "vs_pur_", "vs_ntf_"];

/// Cheap format check to reject garbage before hitting the database.
pub fn is_valid_prefixed_id(s: &str) -> bool {
    let Some(prefix) = ALL_PREFIXES.iter().find(|p| s.starts_with(*p)) else {
        return false;
    };

    let hex_part = &s[prefix.len()..];
    hex_part.len() == 32 && hex_part.chars().all(|c| c.is_ascii_hexdigit())
}

#[derive(Debug, Clone, Copy)]
pub enum EntityType {
    App,
    Transaction,
    Purchase,
    Notification,
}

impl EntityType {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::App => "vs_app",
            Self::Transaction => "vs_txn",
            Self::Purchase => "vs_pur",
            Self::Notification => "vs_ntf",
        }
    }

    pub fn gen_id(&self) -> String {
        format!("{}_{}", self.prefix(), Uuid::new_v4().as_simple())
    }
}
