//! School records.

use serde::{Deserialize, Serialize};

/// A school as served by the backend.
///
/// The store keeps schools both keyed by id and as an ordered list; the
/// backend's response order is authoritative for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct School {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}
