pub mod client;
pub mod feed_bridge;
pub mod handlers;
pub mod server;

pub use server::{start, ServerConfig, ServerHandle};
