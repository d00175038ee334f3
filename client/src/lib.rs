// src/lib.rs

pub mod api;
pub mod channel;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod models;
pub mod ranking;
pub mod reconcile;
pub mod refresh;
pub mod scheduler;
pub mod session;
pub mod state;
pub mod utils;

#[cfg(test)]
mod test_support;

// Entry points for embedding the sync engine.
pub use session::Session;
pub use state::{Store, StoreHandle};
