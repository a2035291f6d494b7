#![warn(clippy::all)]

pub mod client;
pub mod encoding;
pub mod error;
pub mod server;
pub mod store;
pub mod transport;

pub use client::Client;
pub use server::Server;
