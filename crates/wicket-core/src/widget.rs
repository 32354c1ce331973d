use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Identifier of a persisted widget.
///
/// Ids are issued in increasing order and never reused. They are derived
/// from the creation time in milliseconds, bumped when two widgets are
/// created within the same millisecond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WidgetId(pub u64);

impl WidgetId {
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Key under which the record is kept in a [`crate::KvStore`].
    pub fn storage_key(self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for WidgetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WidgetId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(WidgetId)
    }
}

/// The closed set of widget kinds the generator may produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Query,
    Numerical,
    Graphs,
    Image,
    Records,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Query,
        Category::Numerical,
        Category::Graphs,
        Category::Image,
        Category::Records,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Query => "query",
            Category::Numerical => "numerical",
            Category::Graphs => "graphs",
            Category::Image => "image",
            Category::Records => "records",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown widget category '{0}' (expected one of query, numerical, graphs, image, records)")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// A validated generation result, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetDraft {
    pub name: String,
    pub category: Category,
    /// Executable bundle exposing `run_widget(inputs) -> str`.
    pub code: String,
    /// Markup for the input form. Never executed.
    pub presentation: String,
}

/// A persisted widget.
///
/// Everything except `usage_count` is fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Widget {
    pub id: WidgetId,
    pub name: String,
    pub category: Category,
    #[serde(alias = "python_code")]
    pub code: String,
    #[serde(alias = "html_code")]
    pub presentation: String,
    #[serde(alias = "creation_date", deserialize_with = "deserialize_timestamp")]
    pub creation_time: DateTime<Utc>,
    #[serde(default)]
    pub usage_count: u64,
}

impl Widget {
    pub fn from_draft(id: WidgetId, creation_time: DateTime<Utc>, draft: WidgetDraft) -> Self {
        Self {
            id,
            name: draft.name,
            category: draft.category,
            code: draft.code,
            presentation: draft.presentation,
            creation_time,
            usage_count: 0,
        }
    }
}

/// Accepts RFC 3339 timestamps and offset-less ones (read as UTC), which is
/// what older records carry.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| serde::de::Error::custom(format!("invalid timestamp '{raw}': {e}")))
}
