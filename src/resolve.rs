//! Name-to-id resolution over Graph listings.
//!
//! Every name-based lookup must land on exactly one entity before any
//! mutating call goes out. Zero candidates is a not-found carrying the full
//! alternative list; several candidates is a disambiguation request. An
//! ambiguous name is never narrowed by heuristic.

use crate::config::ServerConfig;
use crate::errors::{EntityKind, GatewayError};
use crate::graph::types::{DriveInfo, DriveItemInfo, SiteLocator, WorksheetInfo};
use crate::model::EntityRef;
use crate::state::AppState;
use schemars::JsonSchema;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;

/// Per-request site override bundle; absent fields fall back to the
/// process-wide configuration.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct SiteContext {
    pub site_id: Option<String>,
    pub site_url: Option<String>,
    pub hostname: Option<String>,
    pub site_name: Option<String>,
}

/// Anything the resolution algorithm can pick from.
pub trait NamedCandidate {
    fn candidate_name(&self) -> &str;
    fn entity_ref(&self) -> EntityRef;
}

impl NamedCandidate for DriveInfo {
    fn candidate_name(&self) -> &str {
        &self.name
    }

    fn entity_ref(&self) -> EntityRef {
        EntityRef::new(self.id.clone(), self.name.clone())
    }
}

impl NamedCandidate for DriveItemInfo {
    fn candidate_name(&self) -> &str {
        &self.name
    }

    fn entity_ref(&self) -> EntityRef {
        EntityRef {
            id: self.id.clone(),
            name: self.name.clone(),
            path: self.parent_path(),
            parent_id: self
                .parent_reference
                .as_ref()
                .and_then(|parent| parent.id.clone()),
        }
    }
}

impl NamedCandidate for WorksheetInfo {
    fn candidate_name(&self) -> &str {
        &self.name
    }

    fn entity_ref(&self) -> EntityRef {
        EntityRef::new(self.id.clone(), self.name.clone())
    }
}

/// The decision step of the resolution algorithm, split from fetching so it
/// can be exercised without a backend.
///
/// - name given: case-insensitive exact equality; 0 hits → not found with
///   the full available list, 1 hit → selected, >1 → ambiguous.
/// - name omitted: exactly one candidate auto-selects; several candidates
///   ask the caller to specify; none means there is nothing to pick.
pub fn select_one<T: NamedCandidate>(
    kind: EntityKind,
    requested: Option<&str>,
    candidates: Vec<T>,
) -> Result<T, GatewayError> {
    match requested {
        None => {
            let mut candidates = candidates;
            match candidates.len() {
                0 => Err(GatewayError::NoneAvailable { kind }),
                1 => Ok(candidates.pop().expect("len checked")),
                _ => Err(GatewayError::MissingSelection {
                    kind,
                    available: candidates
                        .iter()
                        .map(|c| c.candidate_name().to_string())
                        .collect(),
                }),
            }
        }
        Some(name) => {
            let available: Vec<String> = candidates
                .iter()
                .map(|c| c.candidate_name().to_string())
                .collect();
            let mut hits: Vec<T> = candidates
                .into_iter()
                .filter(|c| c.candidate_name().eq_ignore_ascii_case(name))
                .collect();
            match hits.len() {
                0 => Err(GatewayError::NotFound {
                    kind,
                    name: name.to_string(),
                    available,
                }),
                1 => Ok(hits.pop().expect("len checked")),
                _ => Err(GatewayError::Ambiguous {
                    kind,
                    name: name.to_string(),
                    matches: hits.iter().map(|c| c.entity_ref()).collect(),
                }),
            }
        }
    }
}

/// Fetch a candidate listing, retrying exactly once (after a fixed delay)
/// when it comes back empty. Absorbs listing lag right after an upload;
/// failures other than emptiness are not retried here.
pub async fn fetch_with_retry<T, F, Fut>(
    retry_delay: Duration,
    fetch: F,
) -> Result<Vec<T>, GatewayError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Vec<T>, GatewayError>>,
{
    let first = fetch().await?;
    if !first.is_empty() {
        return Ok(first);
    }
    tracing::debug!(delay_ms = retry_delay.as_millis() as u64, "empty listing, retrying once");
    tokio::time::sleep(retry_delay).await;
    fetch().await
}

fn parse_site_url(url: &str) -> Result<SiteLocator, GatewayError> {
    let stripped = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    let stripped = stripped.trim_end_matches('/');
    if stripped.is_empty() {
        return Err(GatewayError::validation(format!("invalid siteUrl '{url}'")));
    }
    Ok(match stripped.split_once('/') {
        Some((hostname, rest)) if !rest.is_empty() => SiteLocator::ServerRelative {
            hostname: hostname.to_string(),
            path: format!("/{rest}"),
        },
        Some((hostname, _)) => SiteLocator::Host(hostname.to_string()),
        None => SiteLocator::Host(stripped.to_string()),
    })
}

/// Build a site locator from the request override bundle, falling back to
/// the configured default site, then the tenant root site.
pub fn site_locator(
    ctx: &SiteContext,
    config: &ServerConfig,
) -> Result<SiteLocator, GatewayError> {
    if let Some(site_id) = &ctx.site_id {
        return Ok(SiteLocator::Id(site_id.clone()));
    }
    if let Some(site_url) = &ctx.site_url {
        return parse_site_url(site_url);
    }
    if let Some(site_name) = &ctx.site_name {
        let hostname = ctx
            .hostname
            .clone()
            .or_else(|| config.site_hostname.clone())
            .ok_or_else(|| {
                GatewayError::validation("siteName requires a hostname (request or config)")
            })?;
        return Ok(SiteLocator::ServerRelative {
            hostname,
            path: format!("/sites/{site_name}"),
        });
    }
    if let Some(hostname) = &ctx.hostname {
        return Ok(SiteLocator::Host(hostname.clone()));
    }

    // Process-wide defaults, same ladder.
    if let Some(site_id) = &config.site_id {
        return Ok(SiteLocator::Id(site_id.clone()));
    }
    if let Some(site_url) = &config.site_url {
        return parse_site_url(site_url);
    }
    if let Some(site_name) = &config.site_name {
        let hostname = config.site_hostname.clone().ok_or_else(|| {
            GatewayError::validation("configured site_name requires site_hostname")
        })?;
        return Ok(SiteLocator::ServerRelative {
            hostname,
            path: format!("/sites/{site_name}"),
        });
    }
    if let Some(hostname) = &config.site_hostname {
        return Ok(SiteLocator::Host(hostname.clone()));
    }
    Ok(SiteLocator::Root)
}

/// Resolve the request's site to a Graph site id, with locator-keyed caching.
pub async fn resolve_site(state: &AppState, ctx: &SiteContext) -> Result<String, GatewayError> {
    let locator = site_locator(ctx, &state.config())?;
    let key = locator.cache_key();
    if let Some(site_id) = state.cached_site_id(&key) {
        return Ok(site_id);
    }
    let site = state.graph().resolve_site(&locator).await?;
    state.cache_site_id(key, site.id.clone());
    Ok(site.id)
}

pub async fn resolve_drive(
    state: &AppState,
    ctx: &SiteContext,
    drive_name: Option<&str>,
) -> Result<DriveInfo, GatewayError> {
    let site_id = resolve_site(state, ctx).await?;
    let graph = state.graph();
    let candidates = fetch_with_retry(state.config().retry_delay(), || {
        let graph = graph.clone();
        let site_id = site_id.clone();
        async move { graph.list_drives(&site_id).await }
    })
    .await?;
    select_one(EntityKind::Drive, drive_name, candidates)
}

/// Walk a `/`-separated folder path from the drive root, resolving each
/// segment with the same exactly-one rule, and return the final folder id.
pub async fn resolve_folder(
    state: &AppState,
    drive_id: &str,
    folder_path: &str,
) -> Result<String, GatewayError> {
    let graph = state.graph();
    let mut current: Option<String> = None;
    for segment in folder_path.split('/').filter(|s| !s.trim().is_empty()) {
        let children = graph.list_children(drive_id, current.as_deref()).await?;
        let folders: Vec<DriveItemInfo> =
            children.into_iter().filter(|c| c.is_folder()).collect();
        let folder = select_one(EntityKind::Item, Some(segment), folders)?;
        current = Some(folder.id);
    }
    current.ok_or_else(|| GatewayError::validation("folderPath must contain at least one segment"))
}

/// Resolve a workbook file under a drive. With a folder path the candidates
/// are that folder's workbook files; otherwise the drive root's, falling
/// back to a recursive name search before reporting not-found.
pub async fn resolve_item(
    state: &AppState,
    drive_id: &str,
    item_name: Option<&str>,
    folder_path: Option<&str>,
) -> Result<DriveItemInfo, GatewayError> {
    let config = state.config();
    let graph = state.graph();

    let folder_id = match folder_path {
        Some(path) => Some(resolve_folder(state, drive_id, path).await?),
        None => None,
    };

    let candidates = fetch_with_retry(config.retry_delay(), || {
        let graph = graph.clone();
        let folder_id = folder_id.clone();
        let drive_id = drive_id.to_string();
        async move { graph.list_children(&drive_id, folder_id.as_deref()).await }
    })
    .await?;
    let workbooks: Vec<DriveItemInfo> = candidates
        .into_iter()
        .filter(|item| item.is_file() && config.is_supported_workbook(&item.name))
        .collect();

    match select_one(EntityKind::Item, item_name, workbooks) {
        Err(GatewayError::NotFound {
            kind,
            name,
            available,
        }) if folder_path.is_none() => {
            // The file may live in a subfolder; one recursive search pass
            // before giving up.
            let found = graph.search_items(drive_id, &name).await?;
            let mut hits: Vec<DriveItemInfo> = found
                .into_iter()
                .filter(|item| {
                    item.is_file()
                        && config.is_supported_workbook(&item.name)
                        && item.name.eq_ignore_ascii_case(&name)
                })
                .collect();
            match hits.len() {
                0 => Err(GatewayError::NotFound {
                    kind,
                    name,
                    available,
                }),
                1 => Ok(hits.pop().expect("len checked")),
                _ => Err(GatewayError::Ambiguous {
                    kind,
                    name,
                    matches: hits.iter().map(|c| c.entity_ref()).collect(),
                }),
            }
        }
        other => other,
    }
}

pub async fn resolve_sheet(
    state: &AppState,
    drive_id: &str,
    item_id: &str,
    sheet_name: Option<&str>,
) -> Result<WorksheetInfo, GatewayError> {
    let graph = state.graph();
    let candidates = fetch_with_retry(state.config().retry_delay(), || {
        let graph = graph.clone();
        let drive_id = drive_id.to_string();
        let item_id = item_id.to_string();
        async move { graph.list_worksheets(&drive_id, &item_id).await }
    })
    .await?;
    select_one(EntityKind::Sheet, sheet_name, candidates)
}
