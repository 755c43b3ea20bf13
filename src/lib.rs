//! Client-side state layer for a broker and property marketplace.
//!
//! [`store::Store`] holds the session and every domain collection, applies
//! mutations optimistically and persists them through a
//! [`gateway::Gateway`]. [`chat::ChatRealtime`] feeds pushed chat messages
//! back in, and [`filters`] derives the views pages render.

pub mod chat;
pub mod config;
pub mod error;
pub mod filters;
pub mod gateway;
pub mod models;
pub mod store;
pub mod validation;

pub use error::{Error, Result};
pub use store::{Store, StoreOptions, SyncPolicy};
