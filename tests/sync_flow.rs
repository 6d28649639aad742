//! End-to-end store/backend flows against an in-process fake backend.
//!
//! Each test spins up its own axum server on an ephemeral port and points
//! a fresh store at it, so tests stay independent and assert on real HTTP
//! round trips: cache replacement, the uninitialized-fetch rule, session
//! demotion on 401, login, and validation-message capture.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use gradecache::{ActionOutcome, SessionStore, StoreConfig, UpdateMode};

const GOOD_TOKEN: &str = "token-123";

#[derive(Default)]
struct ServerState {
    /// When set, data routes require this bearer token.
    require_token: Option<&'static str>,
    /// When set, the schools route answers 500.
    schools_fail: bool,
    classes_hits: AtomicUsize,
    class_by_id_hits: AtomicUsize,
}

fn authorized(state: &ServerState, headers: &HeaderMap) -> bool {
    match state.require_token {
        None => true,
        Some(expected) => headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(|v| v == format!("Bearer {}", expected))
            .unwrap_or(false),
    }
}

fn unauthorized() -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "message": "unauthorized" })),
    )
}

fn class_payload(id: &str, activity_points: i64) -> Value {
    json!({
        "id": id,
        "schoolYear": "2025/26",
        "label": format!("5B-{}", id),
        "schoolId": "s1",
        "studentsPerformance": [{
            "id": "sp1",
            "studentId": "st1",
            "classId": id,
            "activityScores": [{"id": "a1", "score": 5}],
            "activityPoints": activity_points,
            "missingHomeworks": 2
        }]
    })
}

async fn classes_index(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if !authorized(&state, &headers) {
        return Err(unauthorized());
    }
    state.classes_hits.fetch_add(1, Ordering::SeqCst);
    Ok(Json(json!([class_payload("c1", 3), class_payload("c2", 3)])))
}

async fn class_by_id(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if !authorized(&state, &headers) {
        return Err(unauthorized());
    }
    state.class_by_id_hits.fetch_add(1, Ordering::SeqCst);
    if id == "ghost" {
        return Ok(Json(Value::Null));
    }
    Ok(Json(class_payload(&id, 3)))
}

async fn create_class(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if !authorized(&state, &headers) {
        return Err(unauthorized());
    }
    // this backend rejects every creation attempt
    Err((
        StatusCode::BAD_REQUEST,
        Json(json!({ "statusCode": 400, "message": "duplicate label" })),
    ))
}

async fn add_student(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if !authorized(&state, &headers) {
        return Err(unauthorized());
    }
    Ok(Json(json!({})))
}

async fn delete_performance(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
) -> Result<StatusCode, (StatusCode, Json<Value>)> {
    if !authorized(&state, &headers) {
        return Err(unauthorized());
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn add_points(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Path((id, _sp_id)): Path<(String, String)>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if !authorized(&state, &headers) {
        return Err(unauthorized());
    }
    // deliberately different from any locally computed value, so tests can
    // tell whether the store used this body or discarded it
    Ok(Json(class_payload(&id, 999)))
}

async fn schools_index(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if !authorized(&state, &headers) {
        return Err(unauthorized());
    }
    if state.schools_fail {
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "message": "boom" })),
        ));
    }
    Ok(Json(json!([
        { "id": "s2", "name": "Second School" },
        { "id": "s1", "name": "First School", "city": "Ptuj" }
    ])))
}

async fn login(Json(body): Json<Value>) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let username = body.get("username").and_then(Value::as_str);
    let password = body.get("password").and_then(Value::as_str);
    if username == Some("teacher") && password == Some("secret") {
        Ok(Json(json!({ "access_token": GOOD_TOKEN })))
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "bad credentials" })),
        ))
    }
}

async fn spawn_backend(state: Arc<ServerState>) -> SocketAddr {
    let app = Router::new()
        .route("/classes", get(classes_index).post(create_class))
        .route("/classes/:id", get(class_by_id))
        .route("/classes/:id/students", post(add_student))
        .route(
            "/classes/:id/studentsPerformance/:sp_id",
            delete(delete_performance),
        )
        .route(
            "/classes/:id/studentsPerformance/:sp_id/activityPoints",
            post(add_points),
        )
        .route("/schools", get(schools_index))
        .route("/auth/login", post(login))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve test backend");
    });
    addr
}

fn store_for(addr: SocketAddr) -> SessionStore {
    SessionStore::new(StoreConfig::new(format!("http://{}", addr))).expect("store")
}

fn points_of(store: &SessionStore, class_id: &str) -> Option<i64> {
    store
        .class(class_id)
        .and_then(|c| c.performance("sp1"))
        .and_then(|sp| sp.activity_points)
}

#[tokio::test]
async fn fetch_replaces_cache_and_initializes() {
    let state = Arc::new(ServerState::default());
    let addr = spawn_backend(Arc::clone(&state)).await;
    let mut store = store_for(addr);

    assert!(!store.is_initialized());
    assert_eq!(store.fetch().await, ActionOutcome::Completed);

    assert!(store.is_initialized());
    assert!(!store.is_loading());
    assert_eq!(store.classes().len(), 2);
    assert!(store.class("c1").is_some());
    assert!(store.class("c2").is_some());

    // an unchanged server collection fetches to an identical cache
    let first = store.classes().clone();
    assert_eq!(store.fetch().await, ActionOutcome::Completed);
    assert_eq!(store.classes(), &first);
}

#[tokio::test]
async fn fetch_by_id_on_uninitialized_store_runs_one_full_fetch_first() {
    let state = Arc::new(ServerState::default());
    let addr = spawn_backend(Arc::clone(&state)).await;
    let mut store = store_for(addr);

    assert_eq!(store.fetch_by_id("c1").await, ActionOutcome::Completed);
    assert_eq!(state.classes_hits.load(Ordering::SeqCst), 1);
    assert_eq!(state.class_by_id_hits.load(Ordering::SeqCst), 1);
    assert!(store.is_initialized());

    // once initialized, only the by-id request goes out
    assert_eq!(store.fetch_by_id("c2").await, ActionOutcome::Completed);
    assert_eq!(state.classes_hits.load(Ordering::SeqCst), 1);
    assert_eq!(state.class_by_id_hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn fetch_by_id_with_null_body_is_a_noop() {
    let state = Arc::new(ServerState::default());
    let addr = spawn_backend(Arc::clone(&state)).await;
    let mut store = store_for(addr);

    assert_eq!(store.fetch().await, ActionOutcome::Completed);
    assert_eq!(store.fetch_by_id("ghost").await, ActionOutcome::Completed);
    assert!(store.class("ghost").is_none());
    assert_eq!(store.classes().len(), 2);
}

#[tokio::test]
async fn stale_token_demotes_session_on_401() {
    let state = Arc::new(ServerState {
        require_token: Some(GOOD_TOKEN),
        ..Default::default()
    });
    let addr = spawn_backend(Arc::clone(&state)).await;
    let mut store = store_for(addr);

    store.update_token("stale".to_string());
    assert!(store.is_authenticated());

    assert_eq!(store.fetch().await, ActionOutcome::Unauthorized);
    assert!(!store.is_authenticated());
    assert!(store.token().is_none());
    assert!(store.classes().is_empty());
}

#[tokio::test]
async fn non_401_failure_preserves_session() {
    let state = Arc::new(ServerState {
        require_token: Some(GOOD_TOKEN),
        schools_fail: true,
        ..Default::default()
    });
    let addr = spawn_backend(Arc::clone(&state)).await;
    let mut store = store_for(addr);

    store.update_token(GOOD_TOKEN.to_string());
    let outcome = store.fetch_schools().await;

    assert!(matches!(outcome, ActionOutcome::Recoverable(_)));
    assert!(store.is_authenticated());
    assert_eq!(store.token(), Some(GOOD_TOKEN));
}

#[tokio::test]
async fn login_installs_token_and_authenticates_later_calls() {
    let state = Arc::new(ServerState {
        require_token: Some(GOOD_TOKEN),
        ..Default::default()
    });
    let addr = spawn_backend(Arc::clone(&state)).await;
    let mut store = store_for(addr);

    let token = store.login("teacher", "secret").await;
    assert_eq!(token.as_deref(), Some(GOOD_TOKEN));
    assert!(store.is_authenticated());

    // the installed token authenticates the data route
    assert_eq!(store.fetch().await, ActionOutcome::Completed);
    assert_eq!(store.classes().len(), 2);
}

#[tokio::test]
async fn failed_login_leaves_prior_state_untouched() {
    let state = Arc::new(ServerState::default());
    let addr = spawn_backend(Arc::clone(&state)).await;
    let mut store = store_for(addr);

    store.update_token("existing".to_string());
    assert_eq!(store.login("teacher", "wrong").await, None);

    assert!(store.is_authenticated());
    assert_eq!(store.token(), Some("existing"));
}

#[tokio::test]
async fn rejected_class_creation_surfaces_validation_message() {
    let state = Arc::new(ServerState::default());
    let addr = spawn_backend(Arc::clone(&state)).await;
    let mut store = store_for(addr);

    let outcome = store.add_class("2025/26", "5B", "s1").await;

    assert_eq!(
        outcome,
        ActionOutcome::Recoverable("duplicate label".to_string())
    );
    assert_eq!(store.last_error(), Some("duplicate label"));
    assert!(store.classes().is_empty());
    assert_eq!(state.classes_hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn optimistic_mutation_discards_the_authoritative_body() {
    let state = Arc::new(ServerState::default());
    let addr = spawn_backend(Arc::clone(&state)).await;
    let mut store = store_for(addr);

    assert_eq!(store.fetch().await, ActionOutcome::Completed);
    assert_eq!(points_of(&store, "c1"), Some(3));

    let outcome = store
        .add_activity_points("c1", "sp1", 2, UpdateMode::Optimistic)
        .await;

    // backend answered 999; the optimistic value wins
    assert_eq!(outcome, ActionOutcome::Completed);
    assert_eq!(points_of(&store, "c1"), Some(5));
}

#[tokio::test]
async fn authoritative_mutation_replaces_with_the_server_aggregate() {
    let state = Arc::new(ServerState::default());
    let addr = spawn_backend(Arc::clone(&state)).await;
    let mut store = store_for(addr);

    assert_eq!(store.fetch().await, ActionOutcome::Completed);

    let outcome = store
        .add_activity_points("c1", "sp1", 2, UpdateMode::Authoritative)
        .await;

    assert_eq!(outcome, ActionOutcome::Completed);
    assert_eq!(points_of(&store, "c1"), Some(999));
}

#[tokio::test]
async fn schools_load_preserves_response_order() {
    let state = Arc::new(ServerState::default());
    let addr = spawn_backend(Arc::clone(&state)).await;
    let mut store = store_for(addr);

    assert_eq!(store.fetch_schools().await, ActionOutcome::Completed);

    let order: Vec<&str> = store.schools_ordered().map(|s| s.id.as_str()).collect();
    assert_eq!(order, vec!["s2", "s1"]);
    assert_eq!(
        store.school("s1").map(|s| s.name.as_str()),
        Some("First School")
    );
}

#[tokio::test]
async fn refresh_all_loads_both_collections() {
    let state = Arc::new(ServerState::default());
    let addr = spawn_backend(Arc::clone(&state)).await;
    let mut store = store_for(addr);

    assert_eq!(store.refresh_all().await, ActionOutcome::Completed);
    assert!(store.is_initialized());
    assert_eq!(store.classes().len(), 2);
    assert_eq!(store.schools_ordered().count(), 2);
}

#[tokio::test]
async fn structural_mutations_refetch_the_affected_class() {
    let state = Arc::new(ServerState::default());
    let addr = spawn_backend(Arc::clone(&state)).await;
    let mut store = store_for(addr);

    assert_eq!(store.fetch().await, ActionOutcome::Completed);
    let by_id_before = state.class_by_id_hits.load(Ordering::SeqCst);

    assert_eq!(
        store.add_student_to_class("c1", "Ana", "Kranjc").await,
        ActionOutcome::Completed
    );
    assert_eq!(
        state.class_by_id_hits.load(Ordering::SeqCst),
        by_id_before + 1
    );

    assert_eq!(
        store.delete_student_from_class("c1", "sp1").await,
        ActionOutcome::Completed
    );
    assert_eq!(
        state.class_by_id_hits.load(Ordering::SeqCst),
        by_id_before + 2
    );
}
