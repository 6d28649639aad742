//! Unauthorized-request guard.
//!
//! Every data access funnels through [`run`]. A failure carrying HTTP 401
//! demotes the session before the error is re-raised unchanged, so the
//! calling action's own failure handling still executes. The client's
//! bearer token is cleared together with the session; a demoted store
//! never keeps a stale token behind.
//!
//! Authentication actions (login, logout, token updates) do not go
//! through the guard.

use std::future::Future;

use tracing::warn;

use crate::api::{ApiClient, ApiError};

use super::session::Session;

/// Apply the demotion rule to an already-awaited result.
pub(crate) fn inspect<T>(
    session: &mut Session,
    api: &mut ApiClient,
    result: Result<T, ApiError>,
) -> Result<T, ApiError> {
    if let Err(ApiError::Unauthorized) = &result {
        warn!("Request rejected with 401, dropping session");
        session.clear();
        api.clear_token();
    }
    result
}

/// Await `op` and demote the session if it failed with 401. The original
/// error is re-raised either way.
pub(crate) async fn run<T, Fut>(
    session: &mut Session,
    api: &mut ApiClient,
    op: Fut,
) -> Result<T, ApiError>
where
    Fut: Future<Output = Result<T, ApiError>>,
{
    let result = op.await;
    inspect(session, api, result)
}
