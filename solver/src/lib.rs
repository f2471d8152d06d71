//! Proposer/Skeptic verification loop for engineering and math problems.
//!
//! A Proposer agent drafts a solution, a Skeptic agent audits it and writes
//! a symbolic verification script, and the Auditor runs that script in a
//! restricted interpreter and combines both signals over a bounded number of
//! attempts. The architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (tag parsing, script runner,
//!   status combination, analytics). No I/O.
//! - **[`io`]**: Side effects (config, credentials, completion HTTP client,
//!   prompt rendering, record store).
//!
//! Orchestration modules ([`agents`], [`audit`], [`fallback`], [`solve`])
//! wire core logic to I/O for the CLI and the HTTP surface.

pub mod agents;
pub mod audit;
pub mod core;
pub mod exit_codes;
pub mod fallback;
pub mod io;
pub mod logging;
pub mod solve;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
