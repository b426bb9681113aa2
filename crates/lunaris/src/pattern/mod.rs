//! Lua string patterns.
//!
//! Patterns are bytewise: classes, sets, quantifiers, captures
//! (including position captures), balanced matches `%b`, and the
//! frontier anchor `%f`. The matcher backtracks with an explicit depth
//! limit; pathological patterns fail with an error instead of blowing
//! the native stack.

mod matcher;

pub use matcher::{first_match, Capture, PatternMatch};
