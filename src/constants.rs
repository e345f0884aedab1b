//! Default values for configuration fields that are not supplied explicitly.

use std::time::Duration;

/// Default listening port when none is set in configuration.
pub const DEFAULT_PORT: u16 = 8080;

/// Default health-check probe interval (`T_health`).
pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Timeout for a single health-check probe.
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(3);

/// Default write-back sync interval (`T_sync`).
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(10);

/// Default store-wide unconditional refill interval (`T_replenish`).
pub const DEFAULT_REPLENISH_INTERVAL: Duration = Duration::from_secs(30);

/// Default inactive-entry cleanup interval (`T_clean`).
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Default inactivity threshold before an in-memory bucket is evicted (`T_inactive`).
pub const DEFAULT_INACTIVE_AFTER: Duration = Duration::from_secs(300);

/// Default request timeout applied when forwarding to an upstream backend.
pub const DEFAULT_FORWARD_TIMEOUT: Duration = Duration::from_secs(30);

/// Name of the header carrying the rate-limit client identifier.
/// `HeaderMap` lookups are case-insensitive, so this also doubles as the
/// exact text used in the "missing header" error message.
pub const API_KEY_HEADER: &str = "X-API-KEY";
