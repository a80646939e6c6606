//! CLI command handlers, one file per command.

mod serve;
mod status;
mod vapid;

pub use serve::run_serve;
pub use status::run_status;
pub use vapid::run_vapid;
