//! Relaywatch - Proxy Endpoint Curator
//!
//! Continuously curates a set of usable proxy endpoints from a raw source
//! list and republishes the working subset.
//!
//! ## Pipeline
//!
//! - Parses `vless` connection strings from a raw text source
//! - Filters candidates against address and SNI whitelists
//! - Verifies each candidate through a spawned proxy engine instance
//! - Tracks per-endpoint latency and a grow/decay stability score
//! - Publishes the vetted subset over a plain-text HTTP endpoint

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod parser;
pub mod probe;
pub mod scoring;
pub mod services;
pub mod whitelist;

pub use config::Config;
pub use error::{RelayError, Result};
