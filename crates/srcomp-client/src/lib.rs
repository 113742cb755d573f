//! `srcomp-client` — driver for the SRComp competition API.
//!
//! Implements [`matchcue_core::CompetitionSource`] over the compbox's HTTP
//! API. One `GET /current` per poll tick, with a request timeout; every
//! failure mode (connect, timeout, HTTP status, bad payload) maps to a
//! [`matchcue_core::SourceError`] that the poll loop recovers from locally.

pub mod client;
pub mod types;

pub use client::SrcompClient;
