//! Centralized interpreter limits and configuration constants.
//!
//! All magic numbers that control runtime behavior are collected here
//! for easy tuning and configuration.

// ===== Call stack =====

/// Maximum number of live call frames per coroutine. Frames are heap
/// allocated, so this bounds memory rather than the native stack; tail
/// calls reuse the current frame and are not counted against it.
pub const MAX_CALL_DEPTH: usize = 32_768;

/// Maximum number of `__call` indirections when resolving a callee.
pub const MAX_CALL_CHAIN: usize = 100;

// ===== Strings =====

/// Maximum length for "short" strings (interned in the string table).
pub const MAX_SHORT_LEN: usize = 40;

// ===== Parser =====

/// Maximum parser recursion depth (prevents native stack overflow on
/// pathological nesting).
pub const MAX_PARSE_DEPTH: usize = 200;

// ===== Metamethods =====

/// Maximum depth for `__index` / `__newindex` metamethod chains.
/// Resolution terminates with an error once this many hops are taken,
/// which also catches cyclic chains.
pub const MAX_META_CHAIN: usize = 2000;

// ===== Pattern matching =====

/// Maximum number of captures in a single pattern.
pub const MAX_CAPTURES: usize = 32;

/// Maximum match recursion depth for pattern matching.
pub const MAX_MATCH_DEPTH: usize = 220;

// ===== GC defaults =====

/// Default GC pause (percentage). 200 = wait until the estimated heap is
/// twice the size it had after the last collection.
pub const DEFAULT_GC_PAUSE: u32 = 200;

/// Default GC step multiplier (percentage).
pub const DEFAULT_GC_STEPMUL: u32 = 100;

/// How much the old generation may grow, relative to its size after the
/// last major collection, before a minor collection is upgraded to a
/// major one (percentage).
pub const DEFAULT_GC_MAJOR_GROWTH: u32 = 100;

/// Baseline heap estimate used before the first collection, in bytes.
pub const GC_INITIAL_THRESHOLD: usize = 256 * 1024;
