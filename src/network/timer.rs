use std::io;
use std::os::unix::io::RawFd;

/// Creates a one-shot timer fd armed `secs` seconds from now. The fd is
/// non-blocking and becomes readable exactly once when the deadline
/// passes; the caller owns it and closes it with its connection.
pub fn arm_idle_timer(secs: u64) -> io::Result<RawFd> {
    let fd = unsafe {
        libc::timerfd_create(
            libc::CLOCK_MONOTONIC,
            libc::TFD_NONBLOCK | libc::TFD_CLOEXEC,
        )
    };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    let spec = libc::itimerspec {
        it_interval: libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        },
        it_value: libc::timespec {
            tv_sec: secs as libc::time_t,
            tv_nsec: 0,
        },
    };
    if unsafe { libc::timerfd_settime(fd, 0, &spec, std::ptr::null_mut()) } < 0 {
        let err = io::Error::last_os_error();
        unsafe {
            libc::close(fd);
        }
        return Err(err);
    }
    Ok(fd)
}

/// Clears a pending or future expiration without closing the fd.
pub fn disarm(fd: RawFd) -> io::Result<()> {
    let spec = libc::itimerspec {
        it_interval: libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        },
        it_value: libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        },
    };
    if unsafe { libc::timerfd_settime(fd, 0, &spec, std::ptr::null_mut()) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Consumes the expiration counter so a level-triggered poll stops
/// reporting the fd as readable.
pub fn acknowledge(fd: RawFd) {
    let mut expirations = [0u8; 8];
    unsafe {
        libc::read(fd, expirations.as_mut_ptr() as *mut libc::c_void, 8);
    }
}
