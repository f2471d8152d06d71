//! Stable exit codes for solver CLI commands.

/// Command succeeded; for `solve`, a passing status was reached.
pub const OK: i32 = 0;
/// Invalid input, config or data directory, or any other error.
pub const INVALID: i32 = 1;
/// `solve` finished but the final attempt was `BOTH_FAILURE`.
pub const UNVERIFIED: i32 = 2;
/// `verify` ran the script and it did not confirm a match.
pub const MISMATCH: i32 = 3;
/// Every credential set failed.
pub const CREDENTIALS_EXHAUSTED: i32 = 4;
