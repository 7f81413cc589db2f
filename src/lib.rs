//! Client-side access layer for the registrar school management API.
//!
//! Everything goes through [`client::HttpClient`]: rate limiting, response
//! caching with request coalescing, token refresh and error classification.
//! [`resources`] wraps it in typed per-entity façades.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod notify;
pub mod rate_limit;
pub mod request;
pub mod resources;
pub mod session;

pub use client::{HttpClient, HttpClientBuilder, RequestOptions};
pub use error::{ApiError, ErrorKind, Result};
