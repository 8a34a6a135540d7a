use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;

/// A resolved entity surfaced to callers: enough to disambiguate on retry.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EntityRef {
    pub id: String,
    pub name: String,
    pub path: Option<String>,
    pub parent_id: Option<String>,
}

impl EntityRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            path: None,
            parent_id: None,
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DriveListResponse {
    pub site_id: String,
    pub drives: Vec<EntityRef>,
}

#[skip_serializing_none]
#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ItemListResponse {
    pub drive_id: String,
    pub drive_name: String,
    pub folder_path: Option<String>,
    pub items: Vec<EntityRef>,
    /// Set when the listing was cut at the configured item cap.
    pub truncated: Option<bool>,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SheetListResponse {
    pub item_id: String,
    pub item_name: String,
    pub sheets: Vec<EntityRef>,
}

#[skip_serializing_none]
#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RangeReadResponse {
    pub drive_id: String,
    pub item_id: String,
    pub sheet_name: String,
    pub address: Option<String>,
    pub values: Vec<Vec<Value>>,
    pub row_count: usize,
    pub column_count: usize,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WriteRangeResponse {
    pub item_id: String,
    pub sheet_name: String,
    pub address: String,
    pub cells_written: usize,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FormatRangeResponse {
    pub item_id: String,
    pub sheet_name: String,
    pub address: String,
    /// Which format facets were sent to Graph, e.g. `["font", "fill"]`.
    pub applied: Vec<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RenameSheetResponse {
    pub item_id: String,
    pub old_name: String,
    pub new_name: String,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RenameItemResponse {
    pub item_id: String,
    pub old_name: String,
    pub new_name: String,
}

/// One cell whose content matched a find-replace search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MatchCandidate {
    pub sheet: String,
    pub address: String,
    pub current_value: String,
    pub match_id: String,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FindReplaceNoMatches {
    pub matches: Vec<MatchCandidate>,
    pub match_count: usize,
    pub sheets_searched: usize,
    pub message: String,
}

#[skip_serializing_none]
#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FindReplacePreviewResponse {
    pub preview_id: String,
    pub matches: Vec<MatchCandidate>,
    pub match_count: usize,
    pub sheets_searched: usize,
    pub truncated: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub confirmation_required: bool,
    pub action: String,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangeLogEntry {
    pub sheet: String,
    pub cell: String,
    pub old_value: String,
    pub new_value: String,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplyFailure {
    pub match_id: String,
    pub cell: Option<String>,
    pub error: String,
}

#[skip_serializing_none]
#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FindReplaceApplyResponse {
    pub applied: bool,
    pub successful: usize,
    pub failed: usize,
    pub errors: Vec<ApplyFailure>,
    pub change_log: Option<Vec<ChangeLogEntry>>,
}

/// Terminal outcomes of one find-replace request. The server layer maps
/// `Preview` to a 409 confirmation-required response; the other two are 200s.
#[derive(Debug)]
pub enum FindReplaceOutcome {
    NoMatches(FindReplaceNoMatches),
    Preview(FindReplacePreviewResponse),
    Applied(FindReplaceApplyResponse),
}
