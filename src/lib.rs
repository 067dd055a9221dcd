//! Run a program on a pseudo-terminal and capture its merged output.
//!
//! Programs change behavior when their output is a pipe: colors disappear,
//! stdio switches to block buffering, progress bars vanish. This crate keeps
//! the interactive behavior while the output is captured, by putting a real
//! PTY between the two sides:
//!
//! - `pty`: master/slave pair allocation and terminal mode control
//! - `child`: fork/exec of the target on the slave end, and reaping
//! - `relay`: the readiness-driven loop moving bytes master -> output
//! - `error`: one fatal error type for the whole pipeline
//!
//! The child gets the slave on stdin, stdout and stderr (its two output
//! streams arrive merged, in write order), the pair runs in raw mode so
//! bytes cross unmodified, and the relay ends exactly when no slave
//! descriptor remains open.

pub mod child;
pub mod error;
pub mod pty;
pub mod relay;

pub use child::Child;
pub use error::{Error, Result};
pub use pty::Pty;
