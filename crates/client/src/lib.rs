//! Tableside ordering client library.
//!
//! This crate implements the client side of the Tableside restaurant ordering
//! system: browsing the catalog, keeping a basket in sync with the remote
//! order service, and authenticating either persistently or as a transparent
//! guest.
//!
//! # Architecture
//!
//! The remote order service is the source of truth for basket contents. The
//! client holds exactly one local projection of the server's cart and replaces
//! it wholesale from each authoritative response - local guesses are never
//! merged back in. Derived numbers (line subtotals, aggregate subtotal, tax,
//! grand total) are recomputed by [`pricing`] after every change.
//!
//! - [`cart`] - the synchronization engine: serialized mutations, wholesale
//!   merge, outcome publication
//! - [`session`] - lazy guest bootstrap (single-flight), login/logout, token
//!   persistence
//! - [`retry`] - bounded retry for transient remote failures
//! - [`catalog`] - menu snapshot cache and display enrichment for cart lines
//! - [`pricing`] - the sole authority for derived totals
//! - [`api`] - typed clients for the order, catalog, auth, and ratings
//!   services
//!
//! # Example
//!
//! ```rust,ignore
//! use tableside_client::{Client, config::ClientConfig};
//!
//! let config = ClientConfig::from_env()?;
//! let client = Client::new(&config)?;
//!
//! // A guest session is bootstrapped transparently on the first mutation.
//! let cart = client.cart().add_item(item.id, 2, Default::default()).await?;
//! println!("total: {}", cart.totals.total);
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod cart;
pub mod catalog;
mod client;
pub mod config;
pub mod error;
pub mod pricing;
pub mod retry;
pub mod session;
pub mod types;

pub use client::Client;
pub use error::{ClientError, Result};
