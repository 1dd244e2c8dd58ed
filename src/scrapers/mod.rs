//! Upstream data acquisition. Pure I/O, no business logic.

pub mod fpl_api;

pub use fpl_api::FplClient;
