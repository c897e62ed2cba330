//! OS plumbing shared by the event loop: the epoll wrapper, per-connection
//! timer fds, and errno triage.

pub mod classify;
pub mod poll;
pub mod timer;
