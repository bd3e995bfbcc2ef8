//! Port management utilities for dev-runner
//!
//! Handles:
//! - Checking port availability
//! - Finding free ports (upward scan with an OS-assigned fallback)
//! - Signalling the process groups of supervised children

use log::{debug, error, warn};
use std::io::ErrorKind;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener};

/// How many consecutive ports the allocator probes before asking the OS
pub const DEFAULT_MAX_ATTEMPTS: u32 = 200;

// ============================================================================
// PORT AVAILABILITY
// ============================================================================

/// Check if a port is available for binding (not in use).
///
/// Only loopback addresses are bound so the probe never triggers a firewall
/// prompt. The listener is dropped before returning, so the port is reusable
/// by the next process immediately.
pub fn is_port_available(port: u16) -> bool {
    let ipv4 = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, port)));
    if ipv4.is_err() {
        return false;
    }
    drop(ipv4);

    // Hosts without IPv6 report AddrNotAvailable; only a conflict counts.
    match TcpListener::bind(SocketAddr::from((Ipv6Addr::LOCALHOST, port))) {
        Ok(_) => true,
        Err(e) => e.kind() != ErrorKind::AddrInUse,
    }
}

/// Ask the OS for any free ephemeral port
pub fn os_assigned_port() -> Option<u16> {
    match TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0))) {
        Ok(listener) => listener.local_addr().ok().map(|addr| addr.port()),
        Err(e) => {
            error!("OS refused to assign an ephemeral port: {}", e);
            None
        }
    }
}

// ============================================================================
// ALLOCATION
// ============================================================================

/// Resolve `desired` to a concrete free port.
///
/// Probes `desired`, `desired + 1`, … for up to `max_attempts` candidates and
/// falls back to an OS-assigned port when the whole range is busy. Returns
/// `None` only if the OS fallback fails as well.
pub fn allocate(desired: u16, max_attempts: u32) -> Option<u16> {
    allocate_with(desired, max_attempts, is_port_available, os_assigned_port)
}

/// Allocation with the default attempt budget
pub fn find_free_port(desired: u16) -> Option<u16> {
    allocate(desired, DEFAULT_MAX_ATTEMPTS)
}

fn allocate_with<P, F>(desired: u16, max_attempts: u32, is_free: P, fallback: F) -> Option<u16>
where
    P: Fn(u16) -> bool,
    F: Fn() -> Option<u16>,
{
    let mut candidate = desired as u32;
    for _ in 0..max_attempts {
        if candidate > u16::MAX as u32 {
            break;
        }
        let port = candidate as u16;
        if port != 0 && is_free(port) {
            if port != desired {
                warn!("Port {} in use, switching to {}", desired, port);
            }
            return Some(port);
        }
        candidate += 1;
    }

    debug!(
        "No free port in {} attempts from {}, asking the OS",
        max_attempts, desired
    );
    fallback()
}

// ============================================================================
// PROCESS GROUP SIGNALS
// ============================================================================

/// Send SIGTERM to the whole process group led by `pid`.
///
/// Children are spawned as group leaders, so the group id equals the pid.
/// If group signalling fails, only the immediate child is signalled.
#[cfg(unix)]
pub fn terminate_process_group(pid: u32) {
    signal_group_or_child(pid, libc::SIGTERM);
}

/// Send SIGKILL to the whole process group led by `pid`
#[cfg(unix)]
pub fn force_kill_process_group(pid: u32) {
    signal_group_or_child(pid, libc::SIGKILL);
}

#[cfg(unix)]
fn signal_group_or_child(pid: u32, signal: libc::c_int) {
    let Ok(pid) = i32::try_from(pid) else {
        warn!("Refusing to signal out-of-range pid {}", pid);
        return;
    };
    if pid <= 0 {
        return;
    }
    // SAFETY: kill(2) has no memory-safety preconditions.
    let group_result = unsafe { libc::kill(-pid, signal) };
    if group_result != 0 {
        debug!("Group signal {} to {} failed, signalling child only", signal, pid);
        let _ = unsafe { libc::kill(pid, signal) };
    }
}

/// Signal whatever is left of the group led by `pid` without touching `pid`
/// itself, which may already be reaped. Returns false when the group is empty.
#[cfg(unix)]
fn signal_group_only(pid: u32, signal: libc::c_int) -> bool {
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: kill(2) has no memory-safety preconditions.
    unsafe { libc::kill(-pid, signal) == 0 }
}

/// SIGTERM the members of a group whose leader has exited
#[cfg(unix)]
pub fn terminate_group_members(pid: u32) -> bool {
    signal_group_only(pid, libc::SIGTERM)
}

/// SIGKILL the members of a group whose leader has exited
#[cfg(unix)]
pub fn force_kill_group_members(pid: u32) -> bool {
    signal_group_only(pid, libc::SIGKILL)
}

/// Whether any process is still in the group led by `pid`
#[cfg(unix)]
pub fn is_group_alive(pid: u32) -> bool {
    signal_group_only(pid, 0)
}

/// Check whether a process with the given pid still exists
#[cfg(unix)]
pub fn is_process_running(pid: u32) -> bool {
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    // SAFETY: signal 0 only performs the existence/permission check.
    unsafe { libc::kill(pid, 0) == 0 }
}

#[cfg(not(unix))]
pub fn terminate_process_group(_pid: u32) {}

#[cfg(not(unix))]
pub fn force_kill_process_group(_pid: u32) {}

#[cfg(not(unix))]
pub fn is_process_running(_pid: u32) -> bool {
    false
}

#[cfg(not(unix))]
pub fn terminate_group_members(_pid: u32) -> bool {
    false
}

#[cfg(not(unix))]
pub fn force_kill_group_members(_pid: u32) -> bool {
    false
}

#[cfg(not(unix))]
pub fn is_group_alive(_pid: u32) -> bool {
    false
}

// ============================================================================
// TESTS
// ============================================================================
