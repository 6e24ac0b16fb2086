//! Publish/subscribe client used to report task activity and receive
//! control commands.

pub mod bridge;
pub mod client;
pub mod config;
pub mod memory;
pub mod mqtt;
pub mod transport;
