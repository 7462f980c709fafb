// src/ingest/providers/mod.rs
pub mod reddit;

pub use reddit::{RedditClient, RedditConfig};
