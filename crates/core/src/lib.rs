//! Tableside Core - Shared types library.
//!
//! This crate provides the common types used across Tableside components,
//! currently the `tableside-client` ordering library (cart synchronization,
//! sessions, catalog).
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients. This keeps it
//! lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, money amounts, and emails

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
