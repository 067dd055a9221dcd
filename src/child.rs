//! Child process launching and reaping.
//!
//! Forks, attaches the child to the slave end of an allocated PTY (stdin,
//! stdout and stderr all point at it, so the two output streams arrive
//! merged on the master in write order), and execs the target program. The
//! parent side keeps the master and the pid; reaping folds the wait status
//! into a single exit code.

use std::ffi::{CString, OsStr};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::process;

use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{dup2, execvp, fork, setsid, write, ForkResult, Pid};

use crate::error::{Error, Result};
use crate::pty::{discard_queued, Pty};

/// A child process running on the slave end of a PTY.
///
/// The handle owns the master end. Once the master reports end-of-stream,
/// [`wait`](Child::wait) consumes the handle, so the child is reaped at most
/// once by construction.
pub struct Child {
    pid: Pid,
    master: OwnedFd,
}

impl Child {
    /// Fork and exec `program` with `args` on the slave end of `pty`.
    ///
    /// `program` doubles as argv[0], the process name the target sees, and
    /// is resolved through `PATH` when it contains no slash. The slave end
    /// is closed on the parent side before this returns; from here on only
    /// the child holds it open, which is what lets the master observe
    /// end-of-stream when the child exits.
    ///
    /// If the exec itself fails, the child writes one descriptive line to
    /// its stderr (the PTY at that point, so the line travels through the
    /// capture) and exits with status 127.
    pub fn spawn<S, I>(pty: Pty, program: S, args: I) -> Result<Self>
    where
        S: AsRef<OsStr>,
        I: IntoIterator,
        I::Item: AsRef<OsStr>,
    {
        let argv = build_argv(program.as_ref(), args)?;
        let (master, slave) = pty.into_parts();

        // SAFETY: the child branch only touches its own descriptors and then
        // execs or exits.
        match unsafe { fork() }.map_err(Error::Fork)? {
            ForkResult::Parent { child } => {
                // The child's inherited copy is the only slave descriptor
                // allowed to stay open; ours would keep the master from ever
                // reporting end-of-stream.
                drop(slave);
                log::debug!("spawned child pid {}", child);
                Ok(Child { pid: child, master })
            }
            ForkResult::Child => exec_on_slave(master, slave, &argv),
        }
    }

    /// The master end of the PTY the child is attached to.
    pub fn master(&self) -> &OwnedFd {
        &self.master
    }

    /// Raw descriptor of the master end.
    pub fn master_fd(&self) -> RawFd {
        self.master.as_raw_fd()
    }

    /// The child's process ID.
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Block until the child terminates and fold its status into an exit
    /// code: the child's own code for a normal exit, 128 plus the signal
    /// number if a signal killed it.
    pub fn wait(self) -> Result<i32> {
        match waitpid(self.pid, None).map_err(Error::Wait)? {
            WaitStatus::Exited(_, code) => Ok(code),
            WaitStatus::Signaled(_, signal, _) => {
                log::debug!("child killed by {}", signal);
                Ok(128 + signal as i32)
            }
            // No stop or trace flags were requested, so any other status
            // still means the child is gone.
            _ => Ok(0),
        }
    }
}

/// Build the exec argument vector: the program path occupies slot 0 (the
/// conventional process name) and the caller's arguments follow in order.
fn build_argv<S, I>(program: &OsStr, args: I) -> Result<Vec<CString>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut argv = vec![cstring(program)?];
    for arg in args {
        argv.push(cstring(arg.as_ref())?);
    }
    Ok(argv)
}

fn cstring(s: &OsStr) -> Result<CString> {
    CString::new(s.as_bytes()).map_err(|e| Error::SpawnFailed(e.to_string()))
}

/// Child-side setup: take over the slave end and exec the target. Nothing
/// can be reported back to the parent from here, so failures end the process
/// directly.
fn exec_on_slave(master: OwnedFd, slave: OwnedFd, argv: &[CString]) -> ! {
    // The master belongs to the parent alone.
    drop(master);

    let slave_raw = slave.as_raw_fd();

    // Drop whatever PTY construction queued before the target gets to write.
    if discard_queued(slave_raw).is_err() {
        process::exit(1);
    }

    // New session with the slave as controlling terminal, so the target is
    // terminal-attached all the way down to /dev/tty. The ioctl is
    // best-effort: isatty on 0/1/2 already holds after the dup2 calls below.
    if setsid().is_err() {
        process::exit(1);
    }
    // SAFETY: the slave descriptor is open and TIOCSCTTY takes a plain
    // integer argument.
    unsafe {
        let _ = libc::ioctl(slave_raw, libc::TIOCSCTTY as _, 0);
    }

    if dup2(slave_raw, libc::STDIN_FILENO).is_err()
        || dup2(slave_raw, libc::STDOUT_FILENO).is_err()
        || dup2(slave_raw, libc::STDERR_FILENO).is_err()
    {
        process::exit(1);
    }

    // Close the original slave fd now that 0/1/2 hold it.
    if slave_raw > libc::STDERR_FILENO {
        drop(slave);
    }

    let _ = execvp(&argv[0], argv);

    // execvp only returns on failure. fd 2 is the PTY here, and a raw write
    // reaches it even when the process-level stderr handle has been swapped
    // for an in-memory capture, so the line lands in the capture stream
    // ahead of the failing status.
    let err = Errno::last();
    let msg = format!(
        "ptycat: failed to execute {}: {}\n",
        argv[0].to_string_lossy(),
        err
    );
    let _ = write(libc::STDERR_FILENO, msg.as_bytes());
    process::exit(127);
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use nix::unistd::read;
    use proptest::prelude::*;

    use super::*;

    /// Drain the master until the child side is gone.
    fn read_to_end(fd: RawFd) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            match read(fd, &mut buf) {
                Ok(0) => break,
                Ok(n) => out.extend_from_slice(&buf[..n]),
                Err(Errno::EINTR) => continue,
                // Master reads report EIO once no slave remains open.
                Err(Errno::EIO) => break,
                Err(e) => panic!("read failed: {e}"),
            }
        }
        out
    }

    #[test]
    fn test_argv_program_doubles_as_argv0() {
        let argv = build_argv(OsStr::new("/bin/echo"), ["hello", "world"]).unwrap();
        assert_eq!(argv.len(), 3);
        assert_eq!(argv[0].to_bytes(), b"/bin/echo");
        assert_eq!(argv[1].to_bytes(), b"hello");
        assert_eq!(argv[2].to_bytes(), b"world");
    }

    #[test]
    fn test_argv_rejects_nul_bytes() {
        assert!(build_argv(OsStr::new("ec\0ho"), Vec::<OsString>::new()).is_err());
        assert!(build_argv(OsStr::new("echo"), [OsString::from("a\0b")]).is_err());
    }

    #[test]
    fn test_spawn_echo_reaches_master() {
        let pty = Pty::allocate().unwrap();
        let child = Child::spawn(pty, "echo", ["hello"]).unwrap();
        assert!(child.pid().as_raw() > 0);

        let output = read_to_end(child.master_fd());
        assert!(String::from_utf8_lossy(&output).contains("hello"));
        assert_eq!(child.wait().unwrap(), 0);
    }

    #[test]
    fn test_wait_propagates_exit_code() {
        let pty = Pty::allocate().unwrap();
        let child = Child::spawn(pty, "sh", ["-c", "exit 7"]).unwrap();
        let _ = read_to_end(child.master_fd());
        assert_eq!(child.wait().unwrap(), 7);
    }

    #[test]
    fn test_wait_folds_signal_death() {
        let pty = Pty::allocate().unwrap();
        let child = Child::spawn(pty, "sh", ["-c", "kill -KILL $$"]).unwrap();
        let _ = read_to_end(child.master_fd());
        assert_eq!(child.wait().unwrap(), 128 + 9);
    }

    #[test]
    fn test_exec_failure_exits_127() {
        let pty = Pty::allocate().unwrap();
        let child = Child::spawn(pty, "/nonexistent/program", Vec::<OsString>::new()).unwrap();
        // The report must arrive on the master as real descriptor traffic,
        // also when the harness has captured this process's stderr handle.
        let output = read_to_end(child.master_fd());
        let report = String::from_utf8_lossy(&output);
        assert!(report.contains("failed to execute"));
        assert!(report.contains("/nonexistent/program"));
        assert_eq!(child.wait().unwrap(), 127);
    }

    proptest! {
        #[test]
        fn argv_layout_holds(args in proptest::collection::vec("[a-zA-Z0-9 ._/-]{0,16}", 0..8)) {
            let os_args: Vec<OsString> = args.iter().map(OsString::from).collect();
            let argv = build_argv(OsStr::new("/bin/tool"), &os_args).unwrap();
            prop_assert_eq!(argv.len(), os_args.len() + 1);
            prop_assert_eq!(argv[0].to_bytes(), b"/bin/tool");
            for (built, original) in argv[1..].iter().zip(&os_args) {
                prop_assert_eq!(built.to_bytes(), original.as_bytes());
            }
        }
    }
}
