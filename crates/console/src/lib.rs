//! Console adapter: bridges the local terminal as a chat platform.
//!
//! Lines typed on stdin become inbound messages from the configured thread;
//! routed messages addressed to that thread are printed to stdout. Useful for
//! trying out routing without credentials for a real platform.

pub mod config;
pub mod plugin;

pub use {config::ConsoleConfig, plugin::ConsolePlugin};
