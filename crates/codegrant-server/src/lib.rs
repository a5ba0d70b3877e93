pub mod config;
pub mod events;
pub mod observability;
pub mod server;

pub use server::{CodegrantServer, ServerBuilder};
