//! Readiness-driven relay from the PTY master to the captured output.
//!
//! Single descriptor, level-triggered, no timeout: the loop suspends in
//! poll() until the master has data or the slave side hangs up, drains the
//! kernel queue, and forwards every chunk in arrival order. End-of-stream on
//! the master is the one and only termination signal.

use std::io::Write;
use std::os::fd::{AsRawFd, BorrowedFd, OwnedFd, RawFd};

use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::poll::{poll, PollFd, PollFlags};
use nix::unistd::read;

use crate::error::{Error, Result};

/// Size of the reusable drain buffer.
const BUF_SIZE: usize = 4096;

/// Outcome of one drain pass over the master.
enum Drain {
    /// Queue empty, slave side still open.
    Pending,
    /// No writer remains on the slave side.
    Eof,
}

/// Forward everything the child writes to `out` until end-of-stream.
///
/// The master is switched to non-blocking first, so the loop only ever
/// suspends inside the readiness wait. Chunks are written and flushed one by
/// one, preserving arrival order; a write failure on `out` is fatal rather
/// than swallowed. Returns normally once no slave descriptor remains open,
/// which on Linux surfaces as EIO (with POLLHUP) instead of a zero-length
/// read.
pub fn run<W: Write>(master: &OwnedFd, out: &mut W) -> Result<()> {
    let fd = master.as_raw_fd();
    set_nonblocking(fd)?;

    let mut buf = [0u8; BUF_SIZE];
    loop {
        wait_readable(fd)?;
        match drain(fd, out, &mut buf)? {
            Drain::Pending => continue,
            Drain::Eof => {
                log::debug!("pty master reached end of stream");
                return Ok(());
            }
        }
    }
}

fn set_nonblocking(fd: RawFd) -> Result<()> {
    let flags = fcntl(fd, FcntlArg::F_GETFL).map_err(Error::SetNonBlocking)?;
    let flags = OFlag::from_bits_truncate(flags);
    fcntl(fd, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK)).map_err(Error::SetNonBlocking)?;
    Ok(())
}

/// Block until the master is readable or the slave side hangs up.
///
/// POLLHUP arrives without being requested, so any successful return means
/// the next drain will make progress; an interrupted wait is retried the
/// same way interrupted reads are.
fn wait_readable(fd: RawFd) -> Result<()> {
    // SAFETY: the caller keeps the descriptor open across the call.
    let borrowed_fd = unsafe { BorrowedFd::borrow_raw(fd) };
    loop {
        let mut fds = [PollFd::new(&borrowed_fd, PollFlags::POLLIN)];
        match poll(&mut fds, -1) {
            Ok(_) => return Ok(()),
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(Error::Poll(e)),
        }
    }
}

/// Read until the kernel queue is empty or the stream ends, forwarding each
/// chunk as it arrives.
fn drain<W: Write>(fd: RawFd, out: &mut W, buf: &mut [u8]) -> Result<Drain> {
    loop {
        match read(fd, buf) {
            Ok(0) => return Ok(Drain::Eof),
            Ok(n) => {
                out.write_all(&buf[..n]).map_err(Error::WriteOutput)?;
                out.flush().map_err(Error::WriteOutput)?;
            }
            Err(Errno::EAGAIN) => return Ok(Drain::Pending),
            Err(Errno::EINTR) => continue,
            // Linux reports a vacated slave side as EIO on the master, not
            // as a zero-length read; both mean the stream is over.
            Err(Errno::EIO) => return Ok(Drain::Eof),
            Err(e) => return Err(Error::Read(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsStr;

    use super::*;
    use crate::child::Child;
    use crate::pty::{set_raw, Pty};

    /// Run `sh -c script` on a fresh raw-mode PTY and capture everything it
    /// writes until end-of-stream.
    fn capture(script: &str) -> (Vec<u8>, i32) {
        let pty = Pty::allocate().expect("Failed to allocate PTY");
        // Raw mode before the child can write, so expected bytes are exact.
        set_raw(pty.master_fd()).expect("Failed to set raw mode");
        let child =
            Child::spawn(pty, OsStr::new("sh"), ["-c", script]).expect("Failed to spawn child");

        let mut out = Vec::new();
        run(child.master(), &mut out).expect("Relay failed");
        let code = child.wait().expect("Failed to reap child");
        (out, code)
    }

    #[test]
    fn test_relays_output_in_order() {
        let (out, code) = capture("printf one; printf two; printf three");
        assert_eq!(out, b"onetwothree");
        assert_eq!(code, 0);
    }

    #[test]
    fn test_merges_streams_in_write_order() {
        let (out, code) = capture("echo out; echo err 1>&2; echo out2");
        assert_eq!(out, b"out\nerr\nout2\n");
        assert_eq!(code, 0);
    }

    #[test]
    fn test_newlines_pass_untranslated() {
        let (out, _) = capture("printf 'a\\nb'");
        assert_eq!(out, b"a\nb");
    }

    #[test]
    fn test_escape_sequences_pass_through() {
        let (out, _) = capture("printf '\\033[31mred\\033[0m'");
        assert_eq!(out, b"\x1b[31mred\x1b[0m");
    }

    #[test]
    fn test_terminates_on_silent_child() {
        let (out, code) = capture("exit 3");
        assert!(out.is_empty());
        assert_eq!(code, 3);
    }

    #[test]
    fn test_survives_bursts_larger_than_buffer() {
        let (out, code) = capture("seq 1 2000");
        let expected: Vec<u8> = (1..=2000).flat_map(|n| format!("{n}\n").into_bytes()).collect();
        assert_eq!(out, expected);
        assert_eq!(code, 0);
    }
}
