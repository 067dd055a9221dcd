//! Error types for the capture pipeline.

use std::io;

use thiserror::Error;

/// Errors from pty setup, child launching, output relaying, and reaping.
///
/// Every variant is fatal to the capture. The only recovery anywhere in the
/// pipeline is the transparent retry of interrupted reads, and that never
/// surfaces as an error value.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to open PTY master: {0}")]
    OpenMaster(#[source] nix::Error),

    #[error("Failed to grant PTY slave access: {0}")]
    Grant(#[source] nix::Error),

    #[error("Failed to unlock PTY slave: {0}")]
    Unlock(#[source] nix::Error),

    #[error("Failed to resolve PTY slave path: {0}")]
    SlavePath(#[source] nix::Error),

    #[error("Failed to open PTY slave: {0}")]
    OpenSlave(#[source] nix::Error),

    #[error("Failed to set raw mode: {0}")]
    RawMode(#[source] nix::Error),

    #[error("Failed to flush queued PTY data: {0}")]
    Flush(#[source] nix::Error),

    #[error("Failed to fork: {0}")]
    Fork(#[source] nix::Error),

    #[error("Failed to spawn child: {0}")]
    SpawnFailed(String),

    #[error("Failed to set PTY master non-blocking: {0}")]
    SetNonBlocking(#[source] nix::Error),

    #[error("Failed to poll PTY master: {0}")]
    Poll(#[source] nix::Error),

    #[error("Failed to read from PTY master: {0}")]
    Read(#[source] nix::Error),

    #[error("Failed to write captured output: {0}")]
    WriteOutput(#[source] io::Error),

    #[error("Failed to wait for child: {0}")]
    Wait(#[source] nix::Error),
}

/// Result type for capture operations.
pub type Result<T> = std::result::Result<T, Error>;
