use std::io;

use tracing::{error, warn};

/// What the event loop should do about a failed syscall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Retry the same operation on the next readiness event.
    Transient,
    /// Drop this connection; the rest of the server is unaffected.
    ConnectionFatal,
    /// Tear the whole server down after closing tracked descriptors.
    ProcessFatal,
}

pub fn classify(err: &io::Error) -> Decision {
    match err.raw_os_error() {
        Some(errno) => classify_errno(errno),
        None => Decision::ConnectionFatal,
    }
}

/// Errno triage. Grouped by consequence: the transient bucket covers
/// empty accept queues, interrupted calls, and registration races the
/// poller already papers over; the fatal buckets split along whether the
/// damage is scoped to one fd or to the process-wide readiness set.
pub fn classify_errno(errno: i32) -> Decision {
    match errno {
        // EWOULDBLOCK aliases EAGAIN on Linux.
        libc::EAGAIN
        | libc::EINTR
        | libc::ECONNABORTED
        | libc::ECONNRESET
        | libc::ESHUTDOWN
        | libc::EEXIST
        | libc::ENOENT => Decision::Transient,
        libc::EMFILE | libc::ENFILE | libc::EADDRINUSE => {
            warn!("descriptor pressure (errno {}), dropping the operation", errno);
            Decision::Transient
        }
        libc::EBADF | libc::EIO => Decision::ConnectionFatal,
        libc::ENOMEM
        | libc::ENOSPC
        | libc::EINVAL
        | libc::EADDRNOTAVAIL
        | libc::EAFNOSUPPORT
        | libc::EACCES
        | libc::EPERM
        | libc::ENOTSOCK
        | libc::ENOBUFS
        | libc::EOPNOTSUPP
        | libc::EFAULT => {
            error!("unrecoverable system error (errno {})", errno);
            Decision::ProcessFatal
        }
        other => {
            warn!("unclassified errno {}, treating as connection-fatal", other);
            Decision::ConnectionFatal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn would_block_is_transient() {
        assert_eq!(classify_errno(libc::EAGAIN), Decision::Transient);
        assert_eq!(classify_errno(libc::EINTR), Decision::Transient);
        assert_eq!(classify_errno(libc::ECONNRESET), Decision::Transient);
    }

    #[test]
    fn registration_races_are_transient() {
        assert_eq!(classify_errno(libc::EEXIST), Decision::Transient);
        assert_eq!(classify_errno(libc::ENOENT), Decision::Transient);
    }

    #[test]
    fn bad_descriptor_kills_the_connection() {
        assert_eq!(classify_errno(libc::EBADF), Decision::ConnectionFatal);
        assert_eq!(classify_errno(libc::EIO), Decision::ConnectionFatal);
    }

    #[test]
    fn resource_exhaustion_kills_the_process() {
        assert_eq!(classify_errno(libc::ENOMEM), Decision::ProcessFatal);
        assert_eq!(classify_errno(libc::ENOSPC), Decision::ProcessFatal);
        assert_eq!(classify_errno(libc::EFAULT), Decision::ProcessFatal);
    }

    #[test]
    fn unknown_errno_is_connection_fatal() {
        assert_eq!(classify_errno(libc::EPROTO), Decision::ConnectionFatal);
    }
}
