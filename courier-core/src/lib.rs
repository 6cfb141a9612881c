//! Courier Core
//!
//! Core types and abstractions for the Courier control dispatcher.
//!
//! This crate contains:
//! - Domain types: control requests, key/value bundles, readings, endpoints
//! - DTOs: payloads for the dispatch API, table-change notifications and
//!   the core registry

pub mod domain;
pub mod dto;
