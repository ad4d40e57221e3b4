//! Exit codes for the `ditto` binary.
//! These codes are part of the public contract; CI scripts branch on them.

pub const SUCCESS: i32 = 0;
pub const DIVERGENCE: i32 = 1; // Determinism or content check failed
pub const CONFIG_ERROR: i32 = 2; // Bad input, bad config, I/O failure
