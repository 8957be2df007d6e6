//! Microsoft SQL Server driver.
//!
//! - [`MssqlSession`]: a single connection implementing the session trait

mod session;

pub use session::MssqlSession;
