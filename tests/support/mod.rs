#![allow(dead_code)]

use async_trait::async_trait;
use graphsheet_gateway::config::ServerConfig;
use graphsheet_gateway::errors::{GatewayError, UpstreamCategory};
use graphsheet_gateway::graph::types::{FileFacet, FolderFacet, ParentReference};
use graphsheet_gateway::graph::{
    DriveInfo, DriveItemInfo, GraphApi, RangeData, SiteInfo, SiteLocator, WorksheetInfo,
};
use graphsheet_gateway::search::{A1Range, cell_a1};
use graphsheet_gateway::state::AppState;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const TEST_SITE_ID: &str = "contoso.sharepoint.com,11111111,22222222";

pub fn test_config() -> ServerConfig {
    ServerConfig {
        tenant_id: None,
        client_id: None,
        client_secret: None,
        graph_base_url: "http://stub.invalid/v1.0".to_string(),
        login_base_url: "http://stub.invalid".to_string(),
        site_id: None,
        site_url: None,
        site_hostname: None,
        site_name: None,
        http_bind_address: "127.0.0.1:0".parse().unwrap(),
        supported_extensions: vec!["xlsx".to_string(), "xlsm".to_string()],
        enabled_tools: None,
        tool_timeout_ms: None,
        graph_timeout_ms: 15_000,
        max_items: Some(500),
        // No delay in tests; the retry itself is still observable.
        retry_delay_ms: 0,
        max_label_steps: 8,
        site_cache_capacity: 16,
    }
}

pub fn config_with(adjust: impl FnOnce(&mut ServerConfig)) -> ServerConfig {
    let mut config = test_config();
    adjust(&mut config);
    config
}

/// In-memory GraphApi used instead of the HTTP client. Writes mutate the
/// stored grids, so a second discovery pass sees applied replacements.
#[derive(Default)]
pub struct StubGraph {
    pub drives: Vec<DriveInfo>,
    /// Items per drive; parent folder id `None` means the drive root.
    items: Vec<(String, Option<String>, DriveItemInfo)>,
    sheets: HashMap<String, Vec<WorksheetInfo>>,
    grids: Mutex<HashMap<(String, String), Vec<Vec<Value>>>>,
    pub writes: Mutex<Vec<(String, String, Value)>>,
    pub renamed_sheets: Mutex<Vec<(String, String)>>,
    pub renamed_items: Mutex<Vec<(String, String)>>,
    fail_writes_at: Mutex<HashSet<String>>,
    /// While positive, drive listings come back empty (decremented per call).
    empty_drive_lists: AtomicUsize,
    pub drive_list_calls: AtomicUsize,
}

impl StubGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_drive(mut self, id: &str, name: &str) -> Self {
        self.drives.push(DriveInfo {
            id: id.to_string(),
            name: name.to_string(),
        });
        self
    }

    pub fn with_file(mut self, drive_id: &str, id: &str, name: &str, parent_path: &str) -> Self {
        self.items.push((
            drive_id.to_string(),
            None,
            file_item(id, name, parent_path),
        ));
        self
    }

    pub fn with_file_in_folder(
        mut self,
        drive_id: &str,
        folder_id: &str,
        id: &str,
        name: &str,
        parent_path: &str,
    ) -> Self {
        self.items.push((
            drive_id.to_string(),
            Some(folder_id.to_string()),
            file_item(id, name, parent_path),
        ));
        self
    }

    pub fn with_folder(mut self, drive_id: &str, id: &str, name: &str) -> Self {
        self.items
            .push((drive_id.to_string(), None, folder_item(id, name)));
        self
    }

    pub fn with_sheet(mut self, item_id: &str, sheet_id: &str, name: &str) -> Self {
        self.sheets
            .entry(item_id.to_string())
            .or_default()
            .push(WorksheetInfo {
                id: sheet_id.to_string(),
                name: name.to_string(),
            });
        self
    }

    /// Seed a sheet's used range, anchored at A1.
    pub fn with_grid(self, item_id: &str, sheet_name: &str, rows: Vec<Vec<Value>>) -> Self {
        self.grids
            .lock()
            .insert((item_id.to_string(), sheet_name.to_string()), rows);
        self
    }

    pub fn failing_write_at(self, address: &str) -> Self {
        self.fail_writes_at.lock().insert(address.to_string());
        self
    }

    /// The next `count` drive listings return empty, simulating listing lag.
    pub fn with_empty_drive_lists(self, count: usize) -> Self {
        self.empty_drive_lists.store(count, Ordering::SeqCst);
        self
    }

    pub fn grid_value(&self, item_id: &str, sheet_name: &str, address: &str) -> Option<Value> {
        let range = A1Range::parse(address).ok()?;
        let grids = self.grids.lock();
        let grid = grids.get(&(item_id.to_string(), sheet_name.to_string()))?;
        grid.get((range.start_row - 1) as usize)?
            .get((range.start_col - 1) as usize)
            .cloned()
    }

    fn used_range(&self, item_id: &str, sheet_name: &str) -> RangeData {
        let grids = self.grids.lock();
        let values = grids
            .get(&(item_id.to_string(), sheet_name.to_string()))
            .cloned()
            .unwrap_or_default();
        let rows = values.len().max(1) as u32;
        let cols = values.first().map(Vec::len).unwrap_or(0).max(1) as u32;
        RangeData {
            address: Some(format!(
                "{sheet_name}!A1:{}",
                cell_a1(cols, rows)
            )),
            values,
            row_count: Some(rows as u64),
            column_count: Some(cols as u64),
        }
    }
}

pub fn file_item(id: &str, name: &str, parent_path: &str) -> DriveItemInfo {
    DriveItemInfo {
        id: id.to_string(),
        name: name.to_string(),
        parent_reference: Some(ParentReference {
            id: Some("root".to_string()),
            path: Some(format!("/drives/d/root:{parent_path}")),
        }),
        file: Some(FileFacet { mime_type: None }),
        folder: None,
    }
}

pub fn folder_item(id: &str, name: &str) -> DriveItemInfo {
    DriveItemInfo {
        id: id.to_string(),
        name: name.to_string(),
        parent_reference: Some(ParentReference {
            id: Some("root".to_string()),
            path: Some("/drives/d/root:".to_string()),
        }),
        file: None,
        folder: Some(FolderFacet {
            child_count: Some(0),
        }),
    }
}

#[async_trait]
impl GraphApi for StubGraph {
    async fn resolve_site(&self, _locator: &SiteLocator) -> Result<SiteInfo, GatewayError> {
        Ok(SiteInfo {
            id: TEST_SITE_ID.to_string(),
            display_name: Some("Contoso".to_string()),
            web_url: None,
        })
    }

    async fn list_drives(&self, _site_id: &str) -> Result<Vec<DriveInfo>, GatewayError> {
        self.drive_list_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.empty_drive_lists.load(Ordering::SeqCst);
        if remaining > 0 {
            self.empty_drive_lists.store(remaining - 1, Ordering::SeqCst);
            return Ok(Vec::new());
        }
        Ok(self.drives.clone())
    }

    async fn list_children(
        &self,
        drive_id: &str,
        folder_id: Option<&str>,
    ) -> Result<Vec<DriveItemInfo>, GatewayError> {
        Ok(self
            .items
            .iter()
            .filter(|(d, parent, _)| d == drive_id && parent.as_deref() == folder_id)
            .map(|(_, _, item)| item.clone())
            .collect())
    }

    async fn search_items(
        &self,
        drive_id: &str,
        query: &str,
    ) -> Result<Vec<DriveItemInfo>, GatewayError> {
        let needle = query.to_lowercase();
        Ok(self
            .items
            .iter()
            .filter(|(d, _, item)| d == drive_id && item.name.to_lowercase().contains(&needle))
            .map(|(_, _, item)| item.clone())
            .collect())
    }

    async fn list_worksheets(
        &self,
        _drive_id: &str,
        item_id: &str,
    ) -> Result<Vec<WorksheetInfo>, GatewayError> {
        Ok(self.sheets.get(item_id).cloned().unwrap_or_default())
    }

    async fn get_range(
        &self,
        _drive_id: &str,
        item_id: &str,
        sheet_name: &str,
        address: &str,
    ) -> Result<RangeData, GatewayError> {
        let range = A1Range::parse(address)
            .map_err(|_| GatewayError::validation(format!("bad address {address}")))?;
        let grids = self.grids.lock();
        let grid = grids
            .get(&(item_id.to_string(), sheet_name.to_string()))
            .cloned()
            .unwrap_or_default();

        let mut values = Vec::new();
        for row in range.start_row..=range.end_row {
            let mut out_row = Vec::new();
            for col in range.start_col..=range.end_col {
                let value = grid
                    .get((row - 1) as usize)
                    .and_then(|r| r.get((col - 1) as usize))
                    .cloned()
                    .unwrap_or(Value::Null);
                out_row.push(value);
            }
            values.push(out_row);
        }

        Ok(RangeData {
            address: Some(format!("{sheet_name}!{}", range.to_a1())),
            values,
            row_count: Some(range.height() as u64),
            column_count: Some(range.width() as u64),
        })
    }

    async fn get_used_range(
        &self,
        _drive_id: &str,
        item_id: &str,
        sheet_name: &str,
    ) -> Result<RangeData, GatewayError> {
        Ok(self.used_range(item_id, sheet_name))
    }

    async fn update_range(
        &self,
        _drive_id: &str,
        item_id: &str,
        sheet_name: &str,
        address: &str,
        body: &Value,
    ) -> Result<(), GatewayError> {
        if self.fail_writes_at.lock().contains(address) {
            return Err(GatewayError::Upstream {
                category: UpstreamCategory::Transient,
                status: Some(503),
                message: "injected write failure".to_string(),
            });
        }

        self.writes
            .lock()
            .push((sheet_name.to_string(), address.to_string(), body.clone()));

        if let Some(values) = body.get("values").and_then(Value::as_array) {
            let range = A1Range::parse(address)
                .map_err(|_| GatewayError::validation(format!("bad address {address}")))?;
            let mut grids = self.grids.lock();
            let grid = grids
                .entry((item_id.to_string(), sheet_name.to_string()))
                .or_default();
            for (r, row) in values.iter().enumerate() {
                let Some(cells) = row.as_array() else { continue };
                for (c, value) in cells.iter().enumerate() {
                    let row_idx = (range.start_row - 1) as usize + r;
                    let col_idx = (range.start_col - 1) as usize + c;
                    if grid.len() <= row_idx {
                        grid.resize(row_idx + 1, Vec::new());
                    }
                    let grid_row = &mut grid[row_idx];
                    if grid_row.len() <= col_idx {
                        grid_row.resize(col_idx + 1, Value::Null);
                    }
                    grid_row[col_idx] = value.clone();
                }
            }
        }
        Ok(())
    }

    async fn update_range_format(
        &self,
        _drive_id: &str,
        _item_id: &str,
        sheet_name: &str,
        address: &str,
        body: &Value,
    ) -> Result<(), GatewayError> {
        self.writes.lock().push((
            sheet_name.to_string(),
            format!("{address}#format"),
            body.clone(),
        ));
        Ok(())
    }

    async fn update_range_font(
        &self,
        _drive_id: &str,
        _item_id: &str,
        sheet_name: &str,
        address: &str,
        body: &Value,
    ) -> Result<(), GatewayError> {
        self.writes.lock().push((
            sheet_name.to_string(),
            format!("{address}#font"),
            body.clone(),
        ));
        Ok(())
    }

    async fn update_range_fill(
        &self,
        _drive_id: &str,
        _item_id: &str,
        sheet_name: &str,
        address: &str,
        body: &Value,
    ) -> Result<(), GatewayError> {
        self.writes.lock().push((
            sheet_name.to_string(),
            format!("{address}#fill"),
            body.clone(),
        ));
        Ok(())
    }

    async fn rename_worksheet(
        &self,
        _drive_id: &str,
        _item_id: &str,
        sheet_name: &str,
        new_name: &str,
    ) -> Result<(), GatewayError> {
        self.renamed_sheets
            .lock()
            .push((sheet_name.to_string(), new_name.to_string()));
        Ok(())
    }

    async fn rename_item(
        &self,
        _drive_id: &str,
        item_id: &str,
        new_name: &str,
    ) -> Result<(), GatewayError> {
        self.renamed_items
            .lock()
            .push((item_id.to_string(), new_name.to_string()));
        Ok(())
    }
}

pub fn app_state(stub: StubGraph) -> Arc<AppState> {
    app_state_with_config(stub, test_config())
}

pub fn app_state_with_config(stub: StubGraph, config: ServerConfig) -> Arc<AppState> {
    Arc::new(AppState::new_with_graph(Arc::new(config), Arc::new(stub)))
}

/// Stub plus state sharing it, for tests that assert on recorded calls.
pub fn shared_state(stub: StubGraph) -> (Arc<StubGraph>, Arc<AppState>) {
    let stub = Arc::new(stub);
    let state = Arc::new(AppState::new_with_graph(
        Arc::new(test_config()),
        stub.clone(),
    ));
    (stub, state)
}

/// A workbook with one drive, one file and one sheet; the common fixture.
pub fn single_workbook_stub() -> StubGraph {
    StubGraph::new()
        .with_drive("d1", "Documents")
        .with_file("d1", "item-1", "budget.xlsx", "/")
        .with_sheet("item-1", "s1", "Sheet1")
}
