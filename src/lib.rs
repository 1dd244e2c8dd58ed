//! FPL Value Backend Library
//!
//! Exposes core modules for use by the binary and tests.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod projection;
pub mod scrapers;
