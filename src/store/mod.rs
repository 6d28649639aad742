//! The session store: application state and the actions that mutate it.
//!
//! `SessionStore` owns the class/school cache, the authenticated session,
//! the loading/initialization flags and the last-error slot. Every data
//! access goes out through the unauthorized-request guard, which logs the
//! store out when the backend answers 401.
//!
//! Counter and score mutations support two per-call modes (see
//! [`UpdateMode`]): optimistic, where the cached record is mutated
//! synchronously and the server response is discarded, and authoritative,
//! where the cached class is replaced wholesale with the server's
//! response. A failed call in optimistic mode deliberately leaves the
//! local mutation in place - responsiveness is traded against strict
//! consistency, and callers re-fetch when they want to correct drift.

mod guard;
mod outcome;
mod session;

pub use outcome::ActionOutcome;
pub use session::{Session, SessionData};

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError, NewClass, NewStudent};
use crate::config::{StoreConfig, UpdateMode};
use crate::models::{ActivityScore, Class, School, StudentPerformance};

/// Application state container for one backend session.
pub struct SessionStore {
    config: StoreConfig,
    api: ApiClient,
    session: Session,

    classes: HashMap<String, Class>,
    schools: HashMap<String, School>,
    school_order: Vec<String>,

    is_loading: bool,
    is_initialized: bool,
    last_error: Option<String>,

    /// Source of client-side tentative score ids.
    local_score_seq: u64,
}

impl SessionStore {
    pub fn new(config: StoreConfig) -> Result<Self, ApiError> {
        let api = ApiClient::new(config.base_url.clone())?;
        Ok(Self {
            config,
            api,
            session: Session::new(),
            classes: HashMap::new(),
            schools: HashMap::new(),
            school_order: Vec::new(),
            is_loading: false,
            is_initialized: false,
            last_error: None,
            local_score_seq: 0,
        })
    }

    // =========================================================================
    // Observable state
    // =========================================================================

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn classes(&self) -> &HashMap<String, Class> {
        &self.classes
    }

    pub fn class(&self, id: &str) -> Option<&Class> {
        self.classes.get(id)
    }

    pub fn schools(&self) -> &HashMap<String, School> {
        &self.schools
    }

    pub fn school(&self, id: &str) -> Option<&School> {
        self.schools.get(id)
    }

    /// Schools in the order the backend returned them.
    pub fn schools_ordered(&self) -> impl Iterator<Item = &School> {
        self.school_order.iter().filter_map(|id| self.schools.get(id))
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    pub fn token(&self) -> Option<&str> {
        self.session.token()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    /// True once the first full fetch has succeeded. Never reset by the
    /// store, not even on logout: cached data stays addressable until the
    /// next fetch replaces it.
    pub fn is_initialized(&self) -> bool {
        self.is_initialized
    }

    /// The last user-visible validation message, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    // =========================================================================
    // Cache plumbing
    // =========================================================================

    /// Replace the whole class cache, keyed by id. Later duplicates win.
    fn rebuild_classes(&mut self, list: Vec<Class>) {
        self.classes = list.into_iter().map(|c| (c.id.clone(), c)).collect();
    }

    fn upsert_class(&mut self, class: Class) {
        self.classes.insert(class.id.clone(), class);
    }

    /// Replace the school map and the ordered id list atomically.
    fn replace_schools(&mut self, list: Vec<School>) {
        self.school_order = list.iter().map(|s| s.id.clone()).collect();
        self.schools = list.into_iter().map(|s| (s.id.clone(), s)).collect();
    }

    fn next_local_score_id(&mut self) -> String {
        self.local_score_seq += 1;
        format!("local-{}", self.local_score_seq)
    }

    /// Run `apply` against the performance record nested under the given
    /// class, if both are cached.
    fn with_performance<R>(
        &mut self,
        class_id: &str,
        sp_id: &str,
        apply: impl FnOnce(&mut StudentPerformance) -> R,
    ) -> Option<R> {
        let Some(class) = self.classes.get_mut(class_id) else {
            debug!(class = class_id, "Class not cached, skipping local mutation");
            return None;
        };
        let Some(sp) = class.performance_mut(sp_id) else {
            debug!(
                class = class_id,
                performance = sp_id,
                "Performance record not found, skipping local mutation"
            );
            return None;
        };
        Some(apply(sp))
    }

    /// Common tail of every counter/score mutation: authoritative mode
    /// replaces the cached class with the returned aggregate, optimistic
    /// mode trusts the local mutation and discards the body. A failure
    /// never rolls the optimistic mutation back.
    fn finish_mutation(
        &mut self,
        what: &str,
        result: Result<Class, ApiError>,
        mode: UpdateMode,
    ) -> ActionOutcome {
        match result {
            Ok(class) => {
                if mode == UpdateMode::Authoritative {
                    self.upsert_class(class);
                }
                ActionOutcome::Completed
            }
            Err(err) => {
                warn!(error = %err, "{} update failed", what);
                ActionOutcome::from_error(&err)
            }
        }
    }

    // =========================================================================
    // Bulk load
    // =========================================================================

    /// Fetch the full class collection and replace the cache wholesale.
    /// On failure the cache is left as it was.
    pub async fn fetch(&mut self) -> ActionOutcome {
        self.is_loading = true;
        let api = self.api.clone();
        let result = guard::run(&mut self.session, &mut self.api, api.fetch_classes()).await;
        self.is_loading = false;

        match result {
            Ok(list) => {
                info!(count = list.len(), "Class collection loaded");
                self.rebuild_classes(list);
                self.is_initialized = true;
                ActionOutcome::Completed
            }
            Err(err) => {
                warn!(error = %err, "Class fetch failed");
                ActionOutcome::from_error(&err)
            }
        }
    }

    /// Fetch one class and upsert it. An uninitialized store performs a
    /// full fetch first so point look-ups never land in an empty cache.
    pub async fn fetch_by_id(&mut self, id: &str) -> ActionOutcome {
        if !self.is_initialized {
            let outcome = self.fetch().await;
            if !outcome.is_completed() {
                return outcome;
            }
        }

        let api = self.api.clone();
        let result = guard::run(&mut self.session, &mut self.api, api.fetch_class(id)).await;

        match result {
            Ok(Some(class)) => {
                self.upsert_class(class);
                ActionOutcome::Completed
            }
            Ok(None) => {
                debug!(class = id, "Empty class response, nothing to update");
                ActionOutcome::Completed
            }
            Err(err) => {
                warn!(error = %err, class = id, "Class fetch failed");
                ActionOutcome::from_error(&err)
            }
        }
    }

    /// Fetch the school collection. The backend's response order is kept
    /// alongside the keyed map.
    pub async fn fetch_schools(&mut self) -> ActionOutcome {
        if !self.config.schools_enabled {
            debug!("School collection disabled, skipping fetch");
            return ActionOutcome::Skipped;
        }

        let api = self.api.clone();
        let result = guard::run(&mut self.session, &mut self.api, api.fetch_schools()).await;

        match result {
            Ok(list) => {
                info!(count = list.len(), "School collection loaded");
                self.replace_schools(list);
                ActionOutcome::Completed
            }
            Err(err) => {
                warn!(error = %err, "School fetch failed");
                ActionOutcome::from_error(&err)
            }
        }
    }

    /// Load classes and schools concurrently. Each collection reconciles
    /// independently; the first failure decides the outcome.
    pub async fn refresh_all(&mut self) -> ActionOutcome {
        self.is_loading = true;

        let api_classes = self.api.clone();
        let api_schools = self.api.clone();
        let schools_enabled = self.config.schools_enabled;

        let (classes_res, schools_res) = futures::future::join(
            async move { api_classes.fetch_classes().await },
            async move {
                if schools_enabled {
                    api_schools.fetch_schools().await.map(Some)
                } else {
                    Ok(None)
                }
            },
        )
        .await;
        self.is_loading = false;

        let classes_res = guard::inspect(&mut self.session, &mut self.api, classes_res);
        let schools_res = guard::inspect(&mut self.session, &mut self.api, schools_res);

        let mut outcome = ActionOutcome::Completed;

        match classes_res {
            Ok(list) => {
                info!(count = list.len(), "Class collection loaded");
                self.rebuild_classes(list);
                self.is_initialized = true;
            }
            Err(err) => {
                warn!(error = %err, "Class refresh failed");
                outcome = ActionOutcome::from_error(&err);
            }
        }

        match schools_res {
            Ok(Some(list)) => self.replace_schools(list),
            Ok(None) => {}
            Err(err) => {
                warn!(error = %err, "School refresh failed");
                if outcome.is_completed() {
                    outcome = ActionOutcome::from_error(&err);
                }
            }
        }

        outcome
    }

    // =========================================================================
    // Counter and score mutations
    // =========================================================================

    /// Record an activity score. In optimistic mode a tentative entry with
    /// a client-local id is appended before the call goes out.
    pub async fn add_activity_score(
        &mut self,
        class_id: &str,
        sp_id: &str,
        score: i64,
        mode: UpdateMode,
    ) -> ActionOutcome {
        if mode == UpdateMode::Optimistic {
            let id = self.next_local_score_id();
            self.with_performance(class_id, sp_id, |sp| {
                sp.push_score(ActivityScore { id, score })
            });
        }

        let api = self.api.clone();
        let result = guard::run(
            &mut self.session,
            &mut self.api,
            api.add_activity_score(class_id, sp_id, score),
        )
        .await;
        self.finish_mutation("Activity score", result, mode)
    }

    /// Remove the score entry matching `score_id` - exactly that one.
    pub async fn delete_activity_score(
        &mut self,
        class_id: &str,
        sp_id: &str,
        score_id: &str,
        mode: UpdateMode,
    ) -> ActionOutcome {
        if mode == UpdateMode::Optimistic {
            self.with_performance(class_id, sp_id, |sp| sp.remove_score(score_id));
        }

        let api = self.api.clone();
        let result = guard::run(
            &mut self.session,
            &mut self.api,
            api.delete_activity_score(class_id, sp_id, score_id),
        )
        .await;
        self.finish_mutation("Activity score", result, mode)
    }

    /// Add `points` to the activity-point counter. The optimistic
    /// increment only applies when the counter is already defined; an
    /// absent counter is never materialized locally.
    pub async fn add_activity_points(
        &mut self,
        class_id: &str,
        sp_id: &str,
        points: i64,
        mode: UpdateMode,
    ) -> ActionOutcome {
        if mode == UpdateMode::Optimistic {
            self.with_performance(class_id, sp_id, |sp| sp.bump_activity_points(points));
        }

        let api = self.api.clone();
        let result = guard::run(
            &mut self.session,
            &mut self.api,
            api.add_activity_points(class_id, sp_id, points),
        )
        .await;
        self.finish_mutation("Activity points", result, mode)
    }

    pub async fn add_missing_homework(
        &mut self,
        class_id: &str,
        sp_id: &str,
        amount: i64,
        mode: UpdateMode,
    ) -> ActionOutcome {
        if mode == UpdateMode::Optimistic {
            self.with_performance(class_id, sp_id, |sp| sp.bump_missing_homeworks(amount));
        }

        let api = self.api.clone();
        let result = guard::run(
            &mut self.session,
            &mut self.api,
            api.add_missing_homework(class_id, sp_id, amount),
        )
        .await;
        self.finish_mutation("Missing homeworks", result, mode)
    }

    pub async fn delete_last_missing_homework(
        &mut self,
        class_id: &str,
        sp_id: &str,
        mode: UpdateMode,
    ) -> ActionOutcome {
        if mode == UpdateMode::Optimistic {
            self.with_performance(class_id, sp_id, |sp| sp.bump_missing_homeworks(-1));
        }

        let api = self.api.clone();
        let result = guard::run(
            &mut self.session,
            &mut self.api,
            api.delete_missing_homework(class_id, sp_id),
        )
        .await;
        self.finish_mutation("Missing homeworks", result, mode)
    }

    pub async fn add_loudness_warning(
        &mut self,
        class_id: &str,
        sp_id: &str,
        mode: UpdateMode,
    ) -> ActionOutcome {
        if mode == UpdateMode::Optimistic {
            self.with_performance(class_id, sp_id, |sp| sp.bump_loudness_warnings(1));
        }

        let api = self.api.clone();
        let result = guard::run(
            &mut self.session,
            &mut self.api,
            api.add_loudness_warning(class_id, sp_id),
        )
        .await;
        self.finish_mutation("Loudness warnings", result, mode)
    }

    pub async fn delete_last_loudness_warning(
        &mut self,
        class_id: &str,
        sp_id: &str,
        mode: UpdateMode,
    ) -> ActionOutcome {
        if mode == UpdateMode::Optimistic {
            self.with_performance(class_id, sp_id, |sp| sp.bump_loudness_warnings(-1));
        }

        let api = self.api.clone();
        let result = guard::run(
            &mut self.session,
            &mut self.api,
            api.delete_loudness_warning(class_id, sp_id),
        )
        .await;
        self.finish_mutation("Loudness warnings", result, mode)
    }

    // =========================================================================
    // Structural mutations
    // =========================================================================

    /// Create a class. A validation rejection (400) deposits the backend's
    /// message into the error slot and leaves the cache untouched; success
    /// re-fetches the whole collection.
    pub async fn add_class(
        &mut self,
        school_year: &str,
        label: &str,
        school_id: &str,
    ) -> ActionOutcome {
        self.last_error = None;

        let api = self.api.clone();
        let new = NewClass {
            school_year,
            label,
            school_id,
        };
        let result = guard::run(
            &mut self.session,
            &mut self.api,
            async move { api.create_class(&new).await },
        )
        .await;

        match result {
            Ok(created) => {
                debug!(class = %created.id, "Class created");
                self.fetch().await
            }
            Err(ApiError::Validation(message)) => {
                info!(message = %message, "Class creation rejected");
                self.last_error = Some(message.clone());
                ActionOutcome::Recoverable(message)
            }
            Err(err) => {
                warn!(error = %err, "Class creation failed");
                ActionOutcome::from_error(&err)
            }
        }
    }

    /// Delete a class, then re-fetch the whole collection.
    pub async fn delete_class(&mut self, id: &str) -> ActionOutcome {
        let api = self.api.clone();
        let result = guard::run(&mut self.session, &mut self.api, api.delete_class(id)).await;

        match result {
            Ok(()) => self.fetch().await,
            Err(err) => {
                warn!(error = %err, class = id, "Class deletion failed");
                ActionOutcome::from_error(&err)
            }
        }
    }

    /// Enroll a student, then re-fetch the affected class.
    pub async fn add_student_to_class(
        &mut self,
        class_id: &str,
        first_name: &str,
        last_name: &str,
    ) -> ActionOutcome {
        let api = self.api.clone();
        let new = NewStudent {
            first_name,
            last_name,
        };
        let result = guard::run(
            &mut self.session,
            &mut self.api,
            async move { api.add_student(class_id, &new).await },
        )
        .await;

        match result {
            Ok(()) => self.fetch_by_id(class_id).await,
            Err(err) => {
                warn!(error = %err, class = class_id, "Student enrollment failed");
                ActionOutcome::from_error(&err)
            }
        }
    }

    /// Remove a student's performance record, then re-fetch the class.
    pub async fn delete_student_from_class(
        &mut self,
        class_id: &str,
        sp_id: &str,
    ) -> ActionOutcome {
        let api = self.api.clone();
        let result = guard::run(
            &mut self.session,
            &mut self.api,
            api.delete_student_performance(class_id, sp_id),
        )
        .await;

        match result {
            Ok(()) => self.fetch_by_id(class_id).await,
            Err(err) => {
                warn!(error = %err, class = class_id, performance = sp_id, "Student removal failed");
                ActionOutcome::from_error(&err)
            }
        }
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    /// Post credentials and install the returned token. Returns the token
    /// on success, `None` on any failure; login never raises.
    pub async fn login(&mut self, username: &str, password: &str) -> Option<String> {
        if !self.config.auth_enabled {
            debug!("Authentication disabled, declining login");
            return None;
        }

        let api = self.api.clone();
        match api.login(username, password).await {
            Ok(token) => {
                self.install_session(token.clone(), Some(username.to_string()));
                info!(user = username, "Login successful");
                Some(token)
            }
            Err(err) => {
                warn!(error = %err, "Login failed");
                None
            }
        }
    }

    /// Drop the session and the client's bearer token together. The class
    /// cache and the initialization flag stay.
    pub fn logout(&mut self) {
        info!("Logging out");
        self.session.clear();
        self.api.clear_token();
    }

    /// Install an externally obtained token: the session becomes
    /// authenticated and all subsequent calls carry the bearer header.
    pub fn update_token(&mut self, token: String) {
        self.install_session(token, None);
    }

    fn install_session(&mut self, token: String, username: Option<String>) {
        self.api.set_token(token.clone());
        self.session.update(SessionData::new(token, username));
    }
}
