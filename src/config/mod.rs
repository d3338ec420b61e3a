//! Configuration, loaded from environment variables at startup.
//!
//! - [`challenge`]: Redis challenge store (code TTLs, attempt caps)
//! - [`cors`]: allowed origins
//! - [`database`]: PostgreSQL pool initialization
//! - [`email`]: SMTP transport settings
//! - [`jwt`]: token signing and lifetimes
//! - [`rate_limit`]: per-endpoint request budgets

pub mod challenge;
pub mod cors;
pub mod database;
pub mod email;
pub mod jwt;
pub mod rate_limit;
