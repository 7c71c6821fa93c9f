//! Cooperative cancellation of pipeline runs.
//!
//! The runner checks the token between stages; a stage that has already
//! started runs to completion.

mod token;

pub use token::CancellationToken;
