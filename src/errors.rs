use crate::model::EntityRef;
use serde::Serialize;
use serde_json::{Value, json};
use std::fmt;
use thiserror::Error;

/// The kinds of named entities the gateway resolves before touching Graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Site,
    Drive,
    Item,
    Sheet,
}

impl EntityKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Site => "site",
            Self::Drive => "drive",
            Self::Item => "item",
            Self::Sheet => "sheet",
        }
    }

    pub fn param_name(self) -> &'static str {
        match self {
            Self::Site => "siteName",
            Self::Drive => "driveName",
            Self::Item => "itemName",
            Self::Sheet => "sheetName",
        }
    }

    /// JSON key carrying the alternative-name list in error bodies.
    pub fn available_key(self) -> &'static str {
        match self {
            Self::Site => "availableSites",
            Self::Drive => "availableDrives",
            Self::Item => "availableItems",
            Self::Sheet => "availableSheets",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Normalized category for failures coming back from Graph itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamCategory {
    Auth,
    Throttled,
    Transient,
    NotFound,
    Invalid,
}

impl UpstreamCategory {
    pub fn classify(status: u16) -> Self {
        match status {
            401 | 403 => Self::Auth,
            429 => Self::Throttled,
            404 | 410 => Self::NotFound,
            500..=599 => Self::Transient,
            _ => Self::Invalid,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Throttled => "throttled",
            Self::Transient => "transient",
            Self::NotFound => "not_found",
            Self::Invalid => "invalid",
        }
    }
}

impl fmt::Display for UpstreamCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0}")]
    Validation(String),

    /// Name parameter omitted while several candidates exist.
    #[error("{} is required: multiple {}s are available", .kind.param_name(), .kind)]
    MissingSelection {
        kind: EntityKind,
        available: Vec<String>,
    },

    /// The enumerable collection is empty, so nothing could ever match.
    #[error("no {kind}s available")]
    NoneAvailable { kind: EntityKind },

    #[error("{kind} '{name}' not found")]
    NotFound {
        kind: EntityKind,
        name: String,
        available: Vec<String>,
    },

    /// A supplied name matched more than one entity. Never auto-resolved.
    #[error("multiple {kind}s match '{name}'")]
    Ambiguous {
        kind: EntityKind,
        name: String,
        matches: Vec<EntityRef>,
    },

    #[error("graph request failed ({category}): {message}")]
    Upstream {
        category: UpstreamCategory,
        status: Option<u16>,
        message: String,
    },
}

impl GatewayError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn transport(message: impl fmt::Display) -> Self {
        Self::Upstream {
            category: UpstreamCategory::Transient,
            status: None,
            message: message.to_string(),
        }
    }

    /// HTTP status the gateway surfaces for this failure.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::MissingSelection { .. } => 400,
            Self::NoneAvailable { .. } | Self::NotFound { .. } => 404,
            Self::Ambiguous { .. } => 409,
            Self::Upstream { category, .. } => match category {
                UpstreamCategory::Auth => 502,
                UpstreamCategory::Throttled => 429,
                UpstreamCategory::Transient => 502,
                UpstreamCategory::NotFound => 404,
                UpstreamCategory::Invalid => 400,
            },
        }
    }

    /// JSON body surfaced to the caller. Not-found and please-specify bodies
    /// carry the full alternative list so the caller can self-correct without
    /// another enumeration round trip.
    pub fn to_body(&self) -> Value {
        match self {
            Self::Validation(_) => json!({ "error": self.to_string() }),
            Self::MissingSelection { kind, available } => json!({
                "error": self.to_string(),
                kind.available_key(): available,
            }),
            Self::NoneAvailable { .. } => json!({ "error": self.to_string() }),
            Self::NotFound {
                kind, available, ..
            } => json!({
                "error": self.to_string(),
                kind.available_key(): available,
            }),
            Self::Ambiguous { kind, matches, .. } => json!({
                "error": self.to_string(),
                "hint": format!("repeat the request with a more specific {}", kind.param_name()),
                "matches": matches,
            }),
            Self::Upstream {
                category, status, ..
            } => json!({
                "error": self.to_string(),
                "category": category.as_str(),
                "upstreamStatus": status,
            }),
        }
    }
}
