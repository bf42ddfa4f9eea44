//! Vibe Store purchase tracking and entitlement service.
//!
//! Records purchases idempotently from verified payment processor webhooks,
//! grants each entitlement at most once, opens checkout sessions, and serves
//! the durable entitlement read that client-side caches load from.

pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod id;
pub mod jwt;
pub mod models;
pub mod pagination;
pub mod payments;
pub mod rate_limit;
