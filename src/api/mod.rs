pub mod client;
pub mod events;
pub mod models;

pub use client::ApiClient;
