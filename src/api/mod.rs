//! HTTP API layer
//!
//! Error responses shared by the auth middleware and REST routes.

mod error;
mod rest;

pub use error::*;
pub use rest::*;
