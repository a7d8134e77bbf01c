//! Centralized default constants for notenexus.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates reference these constants instead of defining their own magic
//! numbers.

// =============================================================================
// ENTITY CACHE
// =============================================================================

/// Seconds after which a cached collection is stale and eligible for refetch.
pub const CACHE_STALE_SECS: u64 = 5 * 60;

/// Seconds an entry with no subscribers may stay idle before eviction.
pub const CACHE_GC_SECS: u64 = 10 * 60;

/// Buffer capacity for the sync event bus.
pub const EVENT_CAPACITY: usize = 256;

// =============================================================================
// NOTES
// =============================================================================

/// Version assigned to a freshly created note, and the fallback when a
/// persisted row omits it.
pub const INITIAL_VERSION: i64 = 1;

/// Separator inserted before AI-generated content appended to a note.
pub const APPENDED_CONTENT_SEPARATOR: &str = "\n\n";

/// Note background palette. The first entry is the default.
pub const NOTE_COLORS: &[&str] = &[
    "#ffffff", "#f8fafc", "#fef3c7", "#fecaca", "#fed7d7", "#e0e7ff", "#ddd6fe", "#f3e8ff",
    "#ecfdf5", "#fdf4ff",
];

/// Default note color.
pub const NOTE_COLOR: &str = "#ffffff";

/// Default workspace color.
pub const WORKSPACE_COLOR: &str = "#3B82F6";

/// Default label color.
pub const LABEL_COLOR: &str = "#6366F1";

// =============================================================================
// ANALYTICS
// =============================================================================

/// Window for the "notes this week" counter.
pub const ANALYTICS_WEEK_DAYS: i64 = 7;

/// Window for the activity heatmap.
pub const ANALYTICS_HEATMAP_DAYS: i64 = 30;

/// Number of labels reported as most used.
pub const ANALYTICS_TOP_LABELS: usize = 5;

// =============================================================================
// ASSISTANT
// =============================================================================

/// Maximum words kept from an analysis summary.
pub const AI_SUMMARY_MAX_WORDS: usize = 100;

/// Maximum suggested tags per analysis.
pub const AI_MAX_TAGS: usize = 5;

/// Maximum action items per analysis.
pub const AI_MAX_TODOS: usize = 5;

/// Maximum productivity suggestions per analysis.
pub const AI_MAX_SUGGESTIONS: usize = 3;

/// Token cap for analysis requests.
pub const AI_ANALYZE_MAX_TOKENS: u32 = 500;

/// Token cap for generation requests.
pub const AI_GENERATE_MAX_TOKENS: u32 = 1000;

/// Sampling temperature for both assistant operations.
pub const AI_TEMPERATURE: f32 = 0.7;

// =============================================================================
// REMOTE STORE
// =============================================================================

/// Request timeout for store calls, in seconds.
pub const STORE_TIMEOUT_SECS: u64 = 30;

/// Retries for transient store failures before a write is treated as terminal.
pub const STORE_MAX_RETRIES: u32 = 2;

/// Base delay for exponential retry backoff, in milliseconds.
pub const STORE_RETRY_BASE_MS: u64 = 200;
