//! Shared constants for end-to-end tests
//!
//! When test data changes (user ids, catalog ids, etc.), update only this file.

// ============================================================================
// Accounts
// ============================================================================

/// Local user id the tests sign in as
pub const TEST_USER: &str = "user-1";

/// The test user's id at the provider
pub const PROVIDER_ACCOUNT_ID: &str = "spotify-user-1";

/// Bearer secret of the cron and account routes
pub const CRON_SECRET: &str = "test-cron-secret";

pub const CLIENT_ID: &str = "test-client-id";
pub const CLIENT_SECRET: &str = "test-client-secret";

/// Access token stored with a fresh grant
pub const INITIAL_ACCESS_TOKEN: &str = "initial-access-token";
pub const INITIAL_REFRESH_TOKEN: &str = "initial-refresh-token";

// ============================================================================
// Provider catalog
// ============================================================================

/// Seed in C major
pub const SEED_TRACK_ID: &str = "track-c-major";

/// One step clockwise from the seed, G major
pub const G_MAJOR_TRACK_ID: &str = "track-g-major";

/// D major
pub const D_MAJOR_TRACK_ID: &str = "track-d-major";

/// A major
pub const A_MAJOR_TRACK_ID: &str = "track-a-major";

/// E major. Nothing in the catalog continues after it.
pub const E_MAJOR_TRACK_ID: &str = "track-e-major";

/// F major, reachable from no other catalog key
pub const F_MAJOR_TRACK_ID: &str = "track-f-major";

/// In E minor, the relative minor of G major, but by the seed's artist
pub const E_MINOR_SAME_ARTIST_TRACK_ID: &str = "track-e-minor";

/// Provider playlist holding the candidate pool
pub const POOL_PLAYLIST_ID: &str = "pool-playlist";

/// The walk the catalog allows from the seed, in order
pub const EXPECTED_WALK: [&str; 5] = [
    SEED_TRACK_ID,
    G_MAJOR_TRACK_ID,
    D_MAJOR_TRACK_ID,
    A_MAJOR_TRACK_ID,
    E_MAJOR_TRACK_ID,
];

/// Duration of every catalog track (milliseconds)
pub const TRACK_DURATION_MS: u64 = 180_000;

// ============================================================================
// Test Timeouts and Configuration
// ============================================================================

/// Maximum time to wait for server to become ready (milliseconds)
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Timeout for individual HTTP requests (seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Polling interval when waiting for server ready (milliseconds)
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 50;
