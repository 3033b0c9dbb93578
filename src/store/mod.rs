//! Store client: RESP framing, the commands the sampler needs, and the
//! connection capability the sampling engine is written against.

pub mod commands;
pub mod connection;
#[cfg(test)]
pub mod memory;
pub mod resp;

pub use commands::Command;
pub use connection::{ConnectionSettings, RespConnection, StoreConnection};
pub use resp::RespValue;
