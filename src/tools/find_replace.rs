//! Two-phase find/replace over workbook cells.
//!
//! A request without `mode=apply` (or `confirm=true`) only discovers matches
//! and returns them as a preview; nothing mutates until the caller resubmits
//! with `selectAll` or an explicit `matchIds` subset. Apply never trusts a
//! client-supplied match list: discovery is re-run fresh and the confirmed
//! subset is filtered out of the current workbook state.

use super::param_enums::{FindReplaceMode, NeighborDirection, SearchScope, SearchStrategy};
use crate::errors::GatewayError;
use crate::model::{
    ApplyFailure, ChangeLogEntry, FindReplaceApplyResponse, FindReplaceNoMatches,
    FindReplaceOutcome, FindReplacePreviewResponse, MatchCandidate,
};
use crate::resolve::{self, SiteContext};
use crate::search::{
    A1Range, LabelQuery, SheetGrid, TextQuery, find_label_neighbor_matches, find_text_matches,
};
use crate::state::AppState;
use crate::utils::make_short_random_id;
use anyhow::Result;
use chrono::Utc;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

const DEFAULT_LABEL_STEPS: u32 = 3;
const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.8;

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FindReplaceParams {
    #[serde(flatten)]
    pub site: SiteContext,
    pub drive_name: Option<String>,
    pub item_name: Option<String>,
    pub folder_path: Option<String>,
    /// Required unless scope is `all_sheets`; a single-sheet workbook
    /// auto-selects.
    pub sheet_name: Option<String>,

    #[serde(default)]
    pub strategy: SearchStrategy,
    /// Text strategy: the term to find.
    pub search_term: Option<String>,
    /// Label strategy: cells equal (or similar) to one of these mark the
    /// spot; the replaced cell is the first non-empty neighbor.
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub scope: SearchScope,
    /// Required when scope is `specific_range`.
    pub range: Option<String>,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub whole_word: bool,
    /// Label strategy: 1.0 requires exact label text.
    pub similarity_threshold: Option<f64>,
    pub max_steps_right: Option<u32>,
    pub max_steps_down: Option<u32>,
    #[serde(default)]
    pub direction: NeighborDirection,

    pub replace_term: String,
    pub mode: Option<FindReplaceMode>,
    /// Legacy alias for `mode=apply`.
    pub confirm: Option<bool>,
    #[serde(default)]
    pub select_all: bool,
    #[serde(default)]
    pub match_ids: Vec<String>,
    /// Echoed from a previous preview; advisory only.
    pub preview_id: Option<String>,
    #[serde(default)]
    pub include_change_log: bool,
}

#[derive(Debug)]
enum CompiledSearch {
    Text(TextQuery),
    Label(LabelQuery),
}

impl CompiledSearch {
    fn run(&self, grid: &SheetGrid, header_only: bool) -> Vec<MatchCandidate> {
        match self {
            Self::Text(query) => find_text_matches(grid, query, header_only),
            Self::Label(query) => find_label_neighbor_matches(grid, query),
        }
    }
}

fn compile_search(
    params: &FindReplaceParams,
    max_label_steps: u32,
) -> Result<CompiledSearch, GatewayError> {
    match params.strategy {
        SearchStrategy::Text => {
            let term = params
                .search_term
                .as_deref()
                .ok_or_else(|| GatewayError::validation("searchTerm is required for text search"))?;
            Ok(CompiledSearch::Text(TextQuery::new(
                term,
                params.case_sensitive,
                params.whole_word,
            )?))
        }
        SearchStrategy::LabelNeighbor => {
            if params.labels.iter().all(|l| l.trim().is_empty()) {
                return Err(GatewayError::validation(
                    "labels is required for label_neighbor search",
                ));
            }
            let threshold = params
                .similarity_threshold
                .unwrap_or(DEFAULT_SIMILARITY_THRESHOLD);
            if !(0.0..=1.0).contains(&threshold) {
                return Err(GatewayError::validation(
                    "similarityThreshold must be between 0.0 and 1.0",
                ));
            }
            Ok(CompiledSearch::Label(LabelQuery {
                labels: params
                    .labels
                    .iter()
                    .map(|l| l.trim().to_string())
                    .filter(|l| !l.is_empty())
                    .collect(),
                similarity_threshold: threshold,
                max_steps_right: params
                    .max_steps_right
                    .unwrap_or(DEFAULT_LABEL_STEPS)
                    .clamp(1, max_label_steps),
                max_steps_down: params
                    .max_steps_down
                    .unwrap_or(DEFAULT_LABEL_STEPS)
                    .clamp(1, max_label_steps),
                direction: params.direction,
            }))
        }
    }
}

struct DiscoveryTarget {
    drive_id: String,
    item_id: String,
    sheets: Vec<String>,
    range: Option<A1Range>,
    header_only: bool,
}

async fn resolve_target(
    state: &AppState,
    params: &FindReplaceParams,
) -> Result<DiscoveryTarget, GatewayError> {
    let range = match params.scope {
        SearchScope::SpecificRange => {
            let raw = params.range.as_deref().ok_or_else(|| {
                GatewayError::validation("range is required when scope is specific_range")
            })?;
            Some(A1Range::parse(raw)?)
        }
        _ => {
            if params.range.is_some() {
                return Err(GatewayError::validation(
                    "range is only valid with scope specific_range",
                ));
            }
            None
        }
    };

    let drive = resolve::resolve_drive(state, &params.site, params.drive_name.as_deref()).await?;
    let item = resolve::resolve_item(
        state,
        &drive.id,
        params.item_name.as_deref(),
        params.folder_path.as_deref(),
    )
    .await?;

    let sheets = match params.scope {
        SearchScope::AllSheets => {
            if params.sheet_name.is_some() {
                return Err(GatewayError::validation(
                    "sheetName conflicts with scope all_sheets",
                ));
            }
            state
                .graph()
                .list_worksheets(&drive.id, &item.id)
                .await?
                .into_iter()
                .map(|sheet| sheet.name)
                .collect()
        }
        _ => {
            let sheet =
                resolve::resolve_sheet(state, &drive.id, &item.id, params.sheet_name.as_deref())
                    .await?;
            vec![sheet.name]
        }
    };

    Ok(DiscoveryTarget {
        drive_id: drive.id,
        item_id: item.id,
        sheets,
        range,
        header_only: params.scope == SearchScope::HeaderOnly,
    })
}

/// SEARCHING: fetch each target sheet's cells and run the compiled search.
async fn discover(
    state: &AppState,
    target: &DiscoveryTarget,
    search: &CompiledSearch,
) -> Result<Vec<MatchCandidate>, GatewayError> {
    let graph = state.graph();
    let mut matches = Vec::new();
    for sheet in &target.sheets {
        let data = match &target.range {
            Some(range) => {
                graph
                    .get_range(&target.drive_id, &target.item_id, sheet, &range.to_a1())
                    .await?
            }
            None => {
                graph
                    .get_used_range(&target.drive_id, &target.item_id, sheet)
                    .await?
            }
        };
        let origin = data.local_address().map(|address| address.to_string());
        let grid = SheetGrid::from_range(sheet.clone(), origin.as_deref(), data.values);
        matches.extend(search.run(&grid, target.header_only));
    }
    Ok(matches)
}

fn replacement_for(search: &CompiledSearch, current: &str, replace_term: &str) -> String {
    match search {
        // Occurrence replacement inside the cell text.
        CompiledSearch::Text(query) => query.replace_all(current, replace_term),
        // The neighbor cell is the value; swap it wholesale.
        CompiledSearch::Label(_) => replace_term.to_string(),
    }
}

pub async fn find_replace(
    state: Arc<AppState>,
    params: FindReplaceParams,
) -> Result<FindReplaceOutcome> {
    let config = state.config();
    let search = compile_search(&params, config.max_label_steps)?;
    let target = resolve_target(&state, &params).await?;

    let mut matches = discover(&state, &target, &search).await?;

    let truncated = match config.max_items() {
        Some(cap) if matches.len() > cap => {
            tracing::warn!(total = matches.len(), cap, "match list truncated");
            matches.truncate(cap);
            true
        }
        _ => false,
    };

    if matches.is_empty() {
        return Ok(FindReplaceOutcome::NoMatches(FindReplaceNoMatches {
            matches: Vec::new(),
            match_count: 0,
            sheets_searched: target.sheets.len(),
            message: "no cells matched the search".to_string(),
        }));
    }

    let apply = match params.mode {
        Some(FindReplaceMode::Apply) => true,
        Some(FindReplaceMode::Preview) => false,
        None => params.confirm.unwrap_or(false),
    };

    if !apply {
        let preview_id = make_short_random_id("prv", 12);
        tracing::info!(
            preview_id = %preview_id,
            matches = matches.len(),
            sheets = target.sheets.len(),
            "find-replace preview"
        );
        return Ok(FindReplaceOutcome::Preview(FindReplacePreviewResponse {
            preview_id,
            match_count: matches.len(),
            sheets_searched: target.sheets.len(),
            matches,
            truncated: truncated.then_some(true),
            created_at: Utc::now(),
            confirmation_required: true,
            action: "resubmit with mode=apply and either selectAll=true or matchIds=[...]"
                .to_string(),
        }));
    }

    // APPLY: filter the fresh discovery down to the confirmed subset.
    let selected: Vec<MatchCandidate> = if params.select_all {
        matches
    } else if !params.match_ids.is_empty() {
        let wanted: HashSet<&str> = params.match_ids.iter().map(String::as_str).collect();
        let current_ids: HashSet<&str> =
            matches.iter().map(|m| m.match_id.as_str()).collect();
        let mut selected: Vec<MatchCandidate> = matches
            .iter()
            .filter(|m| wanted.contains(m.match_id.as_str()))
            .cloned()
            .collect();
        // Stale ids (cell changed since the preview) surface as failures
        // instead of silently applying to different content.
        selected.extend(params.match_ids.iter().filter_map(|id| {
            if current_ids.contains(id.as_str()) {
                None
            } else {
                Some(MatchCandidate {
                    sheet: String::new(),
                    address: String::new(),
                    current_value: String::new(),
                    match_id: id.clone(),
                })
            }
        }));
        selected
    } else {
        return Err(GatewayError::validation(
            "apply requires selectAll=true or a non-empty matchIds list",
        )
        .into());
    };

    let graph = state.graph();
    let mut successful = 0usize;
    let mut errors = Vec::new();
    let mut change_log = params.include_change_log.then(Vec::new);

    for candidate in &selected {
        if candidate.address.is_empty() {
            errors.push(ApplyFailure {
                match_id: candidate.match_id.clone(),
                cell: None,
                error: "match no longer present in current workbook state".to_string(),
            });
            continue;
        }

        let new_value = replacement_for(&search, &candidate.current_value, &params.replace_term);
        let body = json!({ "values": [[new_value.clone()]] });
        match graph
            .update_range(
                &target.drive_id,
                &target.item_id,
                &candidate.sheet,
                &candidate.address,
                &body,
            )
            .await
        {
            Ok(()) => {
                successful += 1;
                if let Some(log) = change_log.as_mut() {
                    log.push(ChangeLogEntry {
                        sheet: candidate.sheet.clone(),
                        cell: candidate.address.clone(),
                        old_value: candidate.current_value.clone(),
                        new_value,
                    });
                }
            }
            Err(err) => {
                tracing::warn!(
                    sheet = %candidate.sheet,
                    cell = %candidate.address,
                    error = %err,
                    "replace write failed"
                );
                errors.push(ApplyFailure {
                    match_id: candidate.match_id.clone(),
                    cell: Some(candidate.address.clone()),
                    error: err.to_string(),
                });
            }
        }
    }

    tracing::info!(successful, failed = errors.len(), "find-replace applied");
    Ok(FindReplaceOutcome::Applied(FindReplaceApplyResponse {
        applied: true,
        successful,
        failed: errors.len(),
        errors,
        change_log,
    }))
}
