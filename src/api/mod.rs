//! HTTP client module for the grading backend.
//!
//! Provides the `ApiClient` the session store issues all of its network
//! calls through, and the typed `ApiError` classified from HTTP status
//! codes. Authentication uses a bearer token obtained from the backend's
//! login endpoint and held per client instance.

pub mod client;
pub mod error;

pub use client::{ApiClient, NewClass, NewStudent};
pub use error::ApiError;
