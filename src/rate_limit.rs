//! Per-IP rate limiting for `POST /checkout`.
//!
//! Every checkout call makes an outbound processor request, so it is the one
//! endpoint worth limiting. Configure with `RATE_LIMIT_CHECKOUT_RPM`
//! (default 10, 0 disables). Requires the server to run with connect info.

use std::sync::Arc;
use std::time::Duration;
use tower_governor::GovernorLayer;
use tower_governor::governor::GovernorConfigBuilder;

/// Rate limiter layer type alias using governor types directly
pub type RateLimitLayer = GovernorLayer<
    tower_governor::key_extractor::PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware<governor::clock::QuantaInstant>,
>;

/// Replenishes one request every `60 / rpm` seconds with a burst of `rpm`.
pub fn checkout_layer(requests_per_minute: u32) -> RateLimitLayer {
    let requests_per_minute = requests_per_minute.max(1);
    let period_secs = (60 / requests_per_minute as u64).max(1);

    let mut builder = GovernorConfigBuilder::default();
    builder
        .period(Duration::from_secs(period_secs))
        .burst_size(requests_per_minute);
    // Both values are non-zero, which is all `finish` checks.
    let config = builder.finish().unwrap_or_default();

    GovernorLayer {
        config: Arc::new(config),
    }
}
