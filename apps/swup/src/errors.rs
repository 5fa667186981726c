//! Errors raised by the CLI itself.
//!
//! Engine failures travel as [`swup_engine::EngineError`] inside
//! `anyhow::Error`; this enum covers what only the command line can decide.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SwupError {
    /// The user declined a confirmation prompt.
    #[error("aborted by the user")]
    Aborted,

    /// No toolchain is in effect, from a version file or the global default.
    #[error("no toolchain is active; run `swup use <selector>` to pick one")]
    NothingActive,

    /// A command started by `swup run` exited unsuccessfully.
    #[error("command exited with status {code}")]
    CommandFailed { code: i32 },
}
