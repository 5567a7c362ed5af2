//! System-wide constants for the Tixgate settlement engine.

/// Basis-point denominator (100% = 10 000 bps).
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Default platform fee on primary sales: 250 bps (2.5%).
pub const DEFAULT_PLATFORM_FEE_BPS: u16 = 250;

/// Default interval between confirmation polls in milliseconds.
pub const DEFAULT_CONFIRM_INTERVAL_MS: u64 = 2_000;

/// Default number of confirmation polls before reporting a timeout.
pub const DEFAULT_CONFIRM_MAX_ATTEMPTS: u32 = 10;

/// How many times a request waits for another request's endpoint creation.
pub const DEFAULT_ENDPOINT_WAIT_ATTEMPTS: u32 = 15;

/// Interval between endpoint readiness checks in milliseconds.
pub const DEFAULT_ENDPOINT_WAIT_MS: u64 = 2_000;

/// Age after which an endpoint claim that never recorded a creation
/// transaction may be taken over, in milliseconds.
pub const DEFAULT_ENDPOINT_STALE_MS: u64 = 60_000;

/// Maximum tickets a single mint order may request.
pub const MAX_TICKETS_PER_ORDER: u32 = 10;

/// Default lifetime of a cached session in seconds.
pub const DEFAULT_SESSION_TTL_SECS: i64 = 3_600;

/// Platform config key holding the marketplace registry address.
pub const MARKETPLACE_REGISTRY_KEY: &str = "marketplace_registry";

/// The message a wallet signs to unlock its custodial key. Fixed, so the
/// deterministic ed25519 signature always rebuilds the same keypair.
pub const CUSTODIAL_KEY_MESSAGE: &str = "Tixgate: unlock my ticket wallet";

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "Tixgate";
