use chrono::{DateTime, Duration, Utc};

/// Token expiry time in minutes.
/// Backend tokens expire after ~30 minutes of inactivity.
const TOKEN_EXPIRY_MINUTES: i64 = 30;

#[derive(Debug, Clone)]
pub struct SessionData {
    pub token: String,
    pub username: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SessionData {
    pub fn new(token: String, username: Option<String>) -> Self {
        Self {
            token,
            username,
            created_at: Utc::now(),
        }
    }

    pub fn is_expired(&self) -> bool {
        let expiry = self.created_at + Duration::minutes(TOKEN_EXPIRY_MINUTES);
        Utc::now() > expiry
    }

    /// Get minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self) -> i64 {
        let expiry = self.created_at + Duration::minutes(TOKEN_EXPIRY_MINUTES);
        (expiry - Utc::now()).num_minutes().max(0)
    }
}

/// Authenticated-session state.
///
/// The authentication flag and the bearer token travel together: a session
/// is authenticated exactly when data is present. There is no way to flip
/// one without the other.
#[derive(Debug, Default)]
pub struct Session {
    data: Option<SessionData>,
}

impl Session {
    pub fn new() -> Self {
        Self { data: None }
    }

    /// Replace the session with fresh data.
    pub fn update(&mut self, data: SessionData) {
        self.data = Some(data);
    }

    /// Drop the session: flag and token clear together.
    pub fn clear(&mut self) {
        self.data = None;
    }

    pub fn token(&self) -> Option<&str> {
        self.data.as_ref().map(|d| d.token.as_str())
    }

    pub fn username(&self) -> Option<&str> {
        self.data.as_ref().and_then(|d| d.username.as_deref())
    }

    /// Check if the session is authenticated (present and not expired)
    pub fn is_authenticated(&self) -> bool {
        self.data.as_ref().map(|d| !d.is_expired()).unwrap_or(false)
    }
}
