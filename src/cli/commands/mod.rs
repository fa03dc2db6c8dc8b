//! Command implementations.

pub mod init;
pub mod watch;

pub use init::run_init;
pub use watch::run_watch;
