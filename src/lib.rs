//! gradecache - client-side state container for a grading/classroom API.
//!
//! The [`SessionStore`] mirrors the backend's classes, schools and
//! per-student performance records in memory and keeps them synchronized
//! over HTTP. Counter and score mutations can apply optimistically (the
//! cache mutates before the server confirms, and a failure leaves the
//! local value in place) or authoritatively (the cache waits for the
//! server's updated aggregate). An unauthorized-request guard watches
//! every data access and logs the store out when the backend answers 401.
//!
//! The store is parameterized by [`StoreConfig`]: base URL plus capability
//! flags for authentication, schools and the default update mode.
//!
//! ```no_run
//! use gradecache::{SessionStore, StoreConfig, UpdateMode};
//!
//! # async fn demo() -> Result<(), gradecache::ApiError> {
//! let mut store = SessionStore::new(StoreConfig::new("https://grades.example.org/api"))?;
//! let _token = store.login("teacher", "secret").await;
//! store.fetch().await;
//! store
//!     .add_activity_points("class-1", "sp-9", 2, UpdateMode::Optimistic)
//!     .await;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod models;
pub mod store;

pub use api::{ApiClient, ApiError};
pub use config::{StoreConfig, UpdateMode};
pub use store::{ActionOutcome, SessionStore};
