//! Guarded host operations.
//!
//! Each function runs the guard exactly as rewritten code would, from inside a
//! runtime frame, and performs the real operation only when the guard allows
//! it. A denied call has no side effect.

use std::convert::Infallible;
use std::net::{TcpStream, ToSocketAddrs};
use std::process::{Child, Command};

use tracing::info;

use callguard_types::Operation;

use crate::errors::{GuardError, GuardedError};
use crate::guard::Guard;
use crate::stack::{Frame, StackWalker};

/// Terminate the process with `code`, if the caller may.
///
/// Only returns when the guard refuses.
pub fn exit<W: StackWalker>(guard: &Guard<W>, code: i32) -> Result<Infallible, GuardError> {
    let _frame = guard
        .engine()
        .walker()
        .enter(Frame::runtime("java.lang.Runtime.exit"));
    guard.check_permission(Operation::RuntimeExit.key())?;
    info!(code, "exit allowed");
    std::process::exit(code)
}

/// Spawn `command`, if the caller may.
pub fn spawn<W: StackWalker>(guard: &Guard<W>, command: &mut Command) -> Result<Child, GuardedError> {
    let _frame = guard
        .engine()
        .walker()
        .enter(Frame::runtime("java.lang.ProcessBuilder.start"));
    guard.check_permission(Operation::ProcessStart.key())?;
    Ok(command.spawn()?)
}

/// Open a TCP connection to `addr`, if the caller may.
pub fn connect<W: StackWalker, A: ToSocketAddrs>(
    guard: &Guard<W>,
    addr: A,
) -> Result<TcpStream, GuardedError> {
    let _frame = guard
        .engine()
        .walker()
        .enter(Frame::runtime("java.net.Socket.connect"));
    guard.check_permission(Operation::SocketConnect.key())?;
    Ok(TcpStream::connect(addr)?)
}
