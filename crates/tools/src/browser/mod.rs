//! Browser automation: a single process-wide Chrome session driven over the
//! DevTools protocol, exposed to the registry as the `browser_*` tool set.

pub mod cdp;
pub mod session;
pub mod tool;

pub use session::{BrowserHandle, ScrollDirection, SessionStatus};
