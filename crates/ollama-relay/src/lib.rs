//! Ollama Relay - pass-through HTTP relay for a local inference server
//!
//! This crate provides a daemon that forwards generation requests to an
//! upstream Ollama server and relays the answer back, either buffered as a
//! single JSON document or streamed chunk-by-chunk, plus a client for
//! callers that consume the relayed NDJSON stream.

pub mod client;
pub mod config;
pub mod error;
pub mod relay;
pub mod testing;

pub use error::RelayError;
