pub mod config;
pub mod daemon;
pub mod logging;
pub mod push;
pub mod reconcile;
pub mod registry;
pub mod session;
