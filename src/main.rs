//! ptycat: run a program on a pseudo-terminal and capture its merged output.
//!
//! The target program sees a terminal on stdin, stdout and stderr, so it
//! keeps its interactive behavior (colors, line buffering, progress bars)
//! while everything it writes lands on ptycat's stdout. The child's exit
//! status becomes ptycat's own.

use std::env;
use std::ffi::{OsStr, OsString};
use std::io;
use std::process::ExitCode;

use nix::unistd::close;

use ptycat::error::Result;
use ptycat::pty::{self, Pty};
use ptycat::relay;
use ptycat::Child;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let mut args = env::args_os();
    let tool = args
        .next()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "ptycat".into());
    let Some(program) = args.next() else {
        print_usage(&tool);
        return ExitCode::FAILURE;
    };
    let args: Vec<OsString> = args.collect();

    // Setup failures are reported while stderr is still ours.
    let child = match setup(&program, &args) {
        Ok(child) => child,
        Err(e) => {
            eprintln!("ptycat: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Only the child's bytes may come out of this process from here on: its
    // own stdin and stderr are closed before the relay starts. The child's
    // descriptors are separate and stay open. Close results carry nothing
    // actionable.
    let _ = close(libc::STDIN_FILENO);
    let _ = close(libc::STDERR_FILENO);

    // Past this point failures surface through the exit status alone; the
    // logger discards writes once its descriptor is gone.
    let mut stdout = io::stdout();
    if let Err(e) = relay::run(child.master(), &mut stdout) {
        log::error!("{e}");
        return ExitCode::FAILURE;
    }

    match child.wait() {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Allocate the PTY, launch the child on its slave end, and put the pair
/// into raw mode.
fn setup(program: &OsStr, args: &[OsString]) -> Result<Child> {
    let pty = Pty::allocate()?;
    let child = Child::spawn(pty, program, args)?;
    // One termios object for the pair: raw mode set through the master
    // covers the slave the child just inherited.
    pty::set_raw(child.master_fd())?;
    Ok(child)
}

fn print_usage(tool: &str) {
    eprintln!("Run a program on a pseudo-terminal and capture its merged output.");
    eprintln!();
    eprintln!("Usage: {tool} <program> [args...]");
}
