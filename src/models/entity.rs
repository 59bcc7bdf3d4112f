//! Entity rows as the storage contract exposes them.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Structured-data tables the core may search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Characters,
    Places,
}

/// One row of `characters`, with its aliases aggregated in.
#[derive(Debug, Clone, FromRow)]
pub struct CharacterRow {
    pub id: i64,
    pub name: String,
    pub summary: Option<String>,
    pub current_activity: Option<String>,
    pub current_location: Option<String>,
    pub aliases: Option<Vec<String>>,
}

/// One row of `places`.
#[derive(Debug, Clone, FromRow)]
pub struct PlaceRow {
    pub id: i64,
    pub name: String,
    #[sqlx(rename = "type")]
    pub place_type: Option<String>,
    pub zone: Option<i64>,
    pub summary: Option<String>,
    pub inhabitants: Option<Vec<String>>,
    pub current_status: Option<String>,
}
