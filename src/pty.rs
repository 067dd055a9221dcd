//! PTY allocation and terminal mode control.
//!
//! Creates the master/slave pair with the POSIX PTY API:
//! - posix_openpt() to open the master
//! - grantpt() to set slave permissions
//! - unlockpt() to unlock the slave
//! - ptsname_r() to get the slave device path
//! - open() on that path for the descriptor the child inherits
//!
//! Also provides the two terminal-mode operations the capture needs:
//! switching the pair into raw mode and discarding queued bytes.

use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};

use nix::fcntl::OFlag;
use nix::pty::{grantpt, posix_openpt, ptsname_r, unlockpt};
use nix::sys::stat::Mode;
use nix::sys::termios::{self, FlushArg, SetArg};

use crate::error::{Error, Result};

/// An allocated pseudoterminal pair.
///
/// Both ends are open and owned until [`Child::spawn`](crate::Child::spawn)
/// splits them: the master stays with the parent for the whole capture, the
/// slave goes to the child and is closed on the parent side. The two
/// descriptors refer to one kernel terminal object, so mode changes through
/// either end apply to the pair.
pub struct Pty {
    master: OwnedFd,
    slave: OwnedFd,
    slave_path: PathBuf,
}

impl Pty {
    /// Allocate a new PTY pair and open its slave end.
    pub fn allocate() -> Result<Self> {
        let master = posix_openpt(OFlag::O_RDWR | OFlag::O_NOCTTY).map_err(Error::OpenMaster)?;
        grantpt(&master).map_err(Error::Grant)?;
        unlockpt(&master).map_err(Error::Unlock)?;
        let slave_path = PathBuf::from(ptsname_r(&master).map_err(Error::SlavePath)?);

        // O_NOCTTY: merely opening the slave must not steal the controlling
        // terminal; the child claims it explicitly after setsid.
        let slave_fd = nix::fcntl::open(
            slave_path.as_path(),
            OFlag::O_RDWR | OFlag::O_NOCTTY,
            Mode::empty(),
        )
        .map_err(Error::OpenSlave)?;
        // SAFETY: open returned a fresh descriptor nothing else owns.
        let slave = unsafe { OwnedFd::from_raw_fd(slave_fd) };

        // Unwrap the PtyMaster newtype so both ends live in the same owner
        // type and fork-time ownership is a plain move.
        let raw_fd = master.as_raw_fd();
        std::mem::forget(master);
        // SAFETY: the descriptor was released by mem::forget above, so this
        // is its sole owner.
        let master = unsafe { OwnedFd::from_raw_fd(raw_fd) };

        log::debug!("allocated pty, slave at {}", slave_path.display());

        Ok(Pty {
            master,
            slave,
            slave_path,
        })
    }

    /// Raw descriptor of the master end.
    pub fn master_fd(&self) -> RawFd {
        self.master.as_raw_fd()
    }

    /// Raw descriptor of the slave end.
    pub fn slave_fd(&self) -> RawFd {
        self.slave.as_raw_fd()
    }

    /// Path of the slave device, e.g. `/dev/pts/3`.
    pub fn slave_path(&self) -> &Path {
        &self.slave_path
    }

    /// Split the pair into (master, slave) for the fork-time ownership
    /// handoff.
    pub(crate) fn into_parts(self) -> (OwnedFd, OwnedFd) {
        (self.master, self.slave)
    }
}

/// Switch the terminal behind `fd` into raw mode.
///
/// cfmakeraw turns off canonical input, echo, signal generation and output
/// post-processing, so every byte the child writes crosses the pair exactly
/// as written (`\n` stays `\n`) and nothing is echoed back at it.
pub fn set_raw(fd: RawFd) -> Result<()> {
    // SAFETY: callers keep the descriptor open for the duration of the call.
    let borrowed_fd = unsafe { BorrowedFd::borrow_raw(fd) };
    let mut termios = termios::tcgetattr(borrowed_fd).map_err(Error::RawMode)?;
    termios::cfmakeraw(&mut termios);
    termios::tcsetattr(borrowed_fd, SetArg::TCSANOW, &termios).map_err(Error::RawMode)?;
    Ok(())
}

/// Discard anything queued on either side of the terminal.
///
/// A freshly allocated pair can carry stray bytes from construction; the
/// child runs this on the slave before exec so the target starts with clean
/// queues.
pub fn discard_queued(fd: RawFd) -> Result<()> {
    // SAFETY: callers keep the descriptor open for the duration of the call.
    let borrowed_fd = unsafe { BorrowedFd::borrow_raw(fd) };
    termios::tcflush(borrowed_fd, FlushArg::TCIOFLUSH).map_err(Error::Flush)
}
