//! Library crate for gamestatus-rs: Minecraft and FiveM status probes and
//! the HTTP endpoints that serve them.
pub mod config;
pub mod error;
pub mod fivem;
pub mod minecraft;
pub mod server;
pub mod store;
pub mod types;
pub mod varint;
