pub mod find_replace;
pub mod param_enums;

use crate::errors::GatewayError;
use crate::model::{
    DriveListResponse, EntityRef, FormatRangeResponse, ItemListResponse, RangeReadResponse,
    RenameItemResponse, RenameSheetResponse, SheetListResponse, WriteRangeResponse,
};
use crate::resolve::{self, NamedCandidate, SiteContext};
use crate::search::A1Range;
use crate::state::AppState;
use anyhow::Result;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

pub use find_replace::{FindReplaceParams, find_replace};

const EXCEL_SHEET_NAME_MAX: usize = 31;
const EXCEL_SHEET_NAME_FORBIDDEN: &[char] = &[':', '\\', '/', '?', '*', '[', ']'];

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListDrivesParams {
    #[serde(flatten)]
    pub site: SiteContext,
}

pub async fn list_drives(state: Arc<AppState>, params: ListDrivesParams) -> Result<DriveListResponse> {
    let site_id = resolve::resolve_site(&state, &params.site).await?;
    let drives = state.graph().list_drives(&site_id).await?;
    Ok(DriveListResponse {
        site_id,
        drives: drives.iter().map(|d| d.entity_ref()).collect(),
    })
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListItemsParams {
    #[serde(flatten)]
    pub site: SiteContext,
    pub drive_name: Option<String>,
    /// Folder to list instead of the drive root, e.g. `Finance/2026`.
    pub folder_path: Option<String>,
    /// Free-text recursive search under the drive root.
    pub search: Option<String>,
}

pub async fn list_items(state: Arc<AppState>, params: ListItemsParams) -> Result<ItemListResponse> {
    if params.folder_path.is_some() && params.search.is_some() {
        return Err(
            GatewayError::validation("folderPath and search are mutually exclusive").into(),
        );
    }

    let drive = resolve::resolve_drive(&state, &params.site, params.drive_name.as_deref()).await?;
    let graph = state.graph();
    let config = state.config();

    let listed = match (&params.folder_path, &params.search) {
        (_, Some(term)) => graph.search_items(&drive.id, term).await?,
        (Some(path), _) => {
            let folder_id = resolve::resolve_folder(&state, &drive.id, path).await?;
            graph.list_children(&drive.id, Some(&folder_id)).await?
        }
        (None, None) => graph.list_children(&drive.id, None).await?,
    };

    let mut items: Vec<EntityRef> = listed
        .iter()
        .filter(|item| item.is_file() && config.is_supported_workbook(&item.name))
        .map(|item| item.entity_ref())
        .collect();

    let truncated = match config.max_items() {
        Some(cap) if items.len() > cap => {
            items.truncate(cap);
            Some(true)
        }
        _ => None,
    };

    Ok(ItemListResponse {
        drive_id: drive.id,
        drive_name: drive.name,
        folder_path: params.folder_path,
        items,
        truncated,
    })
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListSheetsParams {
    #[serde(flatten)]
    pub site: SiteContext,
    pub drive_name: Option<String>,
    pub item_name: Option<String>,
    pub folder_path: Option<String>,
}

pub async fn list_sheets(state: Arc<AppState>, params: ListSheetsParams) -> Result<SheetListResponse> {
    let drive = resolve::resolve_drive(&state, &params.site, params.drive_name.as_deref()).await?;
    let item = resolve::resolve_item(
        &state,
        &drive.id,
        params.item_name.as_deref(),
        params.folder_path.as_deref(),
    )
    .await?;
    let sheets = state.graph().list_worksheets(&drive.id, &item.id).await?;
    Ok(SheetListResponse {
        item_id: item.id,
        item_name: item.name,
        sheets: sheets.iter().map(|s| s.entity_ref()).collect(),
    })
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReadRangeParams {
    #[serde(flatten)]
    pub site: SiteContext,
    pub drive_name: Option<String>,
    pub item_name: Option<String>,
    pub folder_path: Option<String>,
    pub sheet_name: Option<String>,
    /// A1 range; omitted reads the sheet's used range.
    pub range: Option<String>,
}

pub async fn read_range(state: Arc<AppState>, params: ReadRangeParams) -> Result<RangeReadResponse> {
    let drive = resolve::resolve_drive(&state, &params.site, params.drive_name.as_deref()).await?;
    let item = resolve::resolve_item(
        &state,
        &drive.id,
        params.item_name.as_deref(),
        params.folder_path.as_deref(),
    )
    .await?;
    let sheet = resolve::resolve_sheet(&state, &drive.id, &item.id, params.sheet_name.as_deref())
        .await?;

    let graph = state.graph();
    let data = match &params.range {
        Some(range) => {
            let parsed = A1Range::parse(range)?;
            graph
                .get_range(&drive.id, &item.id, &sheet.name, &parsed.to_a1())
                .await?
        }
        None => graph.get_used_range(&drive.id, &item.id, &sheet.name).await?,
    };

    let row_count = data.values.len();
    let column_count = data.values.first().map(Vec::len).unwrap_or(0);
    Ok(RangeReadResponse {
        drive_id: drive.id,
        item_id: item.id,
        sheet_name: sheet.name,
        address: data.local_address().map(|a| a.to_string()),
        values: data.values,
        row_count,
        column_count,
    })
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WriteRangeParams {
    #[serde(flatten)]
    pub site: SiteContext,
    pub drive_name: Option<String>,
    pub item_name: Option<String>,
    pub folder_path: Option<String>,
    pub sheet_name: Option<String>,
    pub range: String,
    /// Row-major cell matrix; must match the range dimensions exactly.
    pub values: Vec<Vec<Value>>,
}

pub async fn write_range(state: Arc<AppState>, params: WriteRangeParams) -> Result<WriteRangeResponse> {
    let target = A1Range::parse(&params.range)?;
    ensure_matrix_fits(&params.values, &target)?;

    let drive = resolve::resolve_drive(&state, &params.site, params.drive_name.as_deref()).await?;
    let item = resolve::resolve_item(
        &state,
        &drive.id,
        params.item_name.as_deref(),
        params.folder_path.as_deref(),
    )
    .await?;
    let sheet = resolve::resolve_sheet(&state, &drive.id, &item.id, params.sheet_name.as_deref())
        .await?;

    let address = target.to_a1();
    state
        .graph()
        .update_range(
            &drive.id,
            &item.id,
            &sheet.name,
            &address,
            &json!({ "values": params.values }),
        )
        .await?;

    tracing::info!(item = %item.name, sheet = %sheet.name, %address, "range written");
    Ok(WriteRangeResponse {
        item_id: item.id,
        sheet_name: sheet.name,
        address,
        cells_written: target.width() * target.height(),
    })
}

fn ensure_matrix_fits(values: &[Vec<Value>], target: &A1Range) -> Result<(), GatewayError> {
    if values.is_empty() {
        return Err(GatewayError::validation("values must not be empty"));
    }
    if values.len() != target.height() {
        return Err(GatewayError::validation(format!(
            "values has {} row(s) but range {} spans {}",
            values.len(),
            target.to_a1(),
            target.height()
        )));
    }
    for (idx, row) in values.iter().enumerate() {
        if row.len() != target.width() {
            return Err(GatewayError::validation(format!(
                "values row {} has {} column(s) but range {} spans {}",
                idx,
                row.len(),
                target.to_a1(),
                target.width()
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FormatRangeParams {
    #[serde(flatten)]
    pub site: SiteContext,
    pub drive_name: Option<String>,
    pub item_name: Option<String>,
    pub folder_path: Option<String>,
    pub sheet_name: Option<String>,
    pub range: String,
    pub bold: Option<bool>,
    pub italic: Option<bool>,
    pub font_size: Option<f64>,
    /// `#RRGGBB`
    pub font_color: Option<String>,
    /// `#RRGGBB`
    pub fill_color: Option<String>,
    /// Excel number format code, e.g. `0.00%` or `yyyy-mm-dd`.
    pub number_format: Option<String>,
    pub horizontal_alignment: Option<String>,
}

pub async fn format_range(state: Arc<AppState>, params: FormatRangeParams) -> Result<FormatRangeResponse> {
    let target = A1Range::parse(&params.range)?;

    let mut font = serde_json::Map::new();
    if let Some(bold) = params.bold {
        font.insert("bold".into(), json!(bold));
    }
    if let Some(italic) = params.italic {
        font.insert("italic".into(), json!(italic));
    }
    if let Some(size) = params.font_size {
        if !(1.0..=409.0).contains(&size) {
            return Err(GatewayError::validation("fontSize must be between 1 and 409").into());
        }
        font.insert("size".into(), json!(size));
    }
    if let Some(color) = &params.font_color {
        font.insert("color".into(), json!(validate_color("fontColor", color)?));
    }

    let fill_color = params
        .fill_color
        .as_deref()
        .map(|color| validate_color("fillColor", color))
        .transpose()?;
    let alignment = params
        .horizontal_alignment
        .as_deref()
        .map(normalize_alignment)
        .transpose()?;

    if font.is_empty() && fill_color.is_none() && alignment.is_none() && params.number_format.is_none()
    {
        return Err(GatewayError::validation("no format fields supplied").into());
    }

    let drive = resolve::resolve_drive(&state, &params.site, params.drive_name.as_deref()).await?;
    let item = resolve::resolve_item(
        &state,
        &drive.id,
        params.item_name.as_deref(),
        params.folder_path.as_deref(),
    )
    .await?;
    let sheet = resolve::resolve_sheet(&state, &drive.id, &item.id, params.sheet_name.as_deref())
        .await?;

    let graph = state.graph();
    let address = target.to_a1();
    let mut applied = Vec::new();

    if !font.is_empty() {
        graph
            .update_range_font(&drive.id, &item.id, &sheet.name, &address, &Value::Object(font))
            .await?;
        applied.push("font".to_string());
    }
    if let Some(color) = fill_color {
        graph
            .update_range_fill(
                &drive.id,
                &item.id,
                &sheet.name,
                &address,
                &json!({ "color": color }),
            )
            .await?;
        applied.push("fill".to_string());
    }
    if let Some(alignment) = alignment {
        graph
            .update_range_format(
                &drive.id,
                &item.id,
                &sheet.name,
                &address,
                &json!({ "horizontalAlignment": alignment }),
            )
            .await?;
        applied.push("alignment".to_string());
    }
    if let Some(code) = &params.number_format {
        // Graph wants a full matrix; broadcast the single code.
        let row = vec![json!(code); target.width()];
        let matrix = vec![row; target.height()];
        graph
            .update_range(
                &drive.id,
                &item.id,
                &sheet.name,
                &address,
                &json!({ "numberFormat": matrix }),
            )
            .await?;
        applied.push("numberFormat".to_string());
    }

    Ok(FormatRangeResponse {
        item_id: item.id,
        sheet_name: sheet.name,
        address,
        applied,
    })
}

fn validate_color(field: &str, color: &str) -> Result<String, GatewayError> {
    let valid = color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit());
    if !valid {
        return Err(GatewayError::validation(format!(
            "{field} must be '#RRGGBB', got '{color}'"
        )));
    }
    Ok(color.to_ascii_uppercase())
}

fn normalize_alignment(value: &str) -> Result<String, GatewayError> {
    let normalized = match value.to_ascii_lowercase().as_str() {
        "general" => "General",
        "left" => "Left",
        "center" | "centre" => "Center",
        "right" => "Right",
        "fill" => "Fill",
        "justify" => "Justify",
        other => {
            return Err(GatewayError::validation(format!(
                "invalid horizontalAlignment '{other}'. valid: general|left|center|right|fill|justify"
            )));
        }
    };
    Ok(normalized.to_string())
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RenameSheetParams {
    #[serde(flatten)]
    pub site: SiteContext,
    pub drive_name: Option<String>,
    pub item_name: Option<String>,
    pub folder_path: Option<String>,
    pub sheet_name: Option<String>,
    pub new_name: String,
}

pub async fn rename_sheet(state: Arc<AppState>, params: RenameSheetParams) -> Result<RenameSheetResponse> {
    let new_name = params.new_name.trim();
    ensure_valid_sheet_name(new_name)?;

    let drive = resolve::resolve_drive(&state, &params.site, params.drive_name.as_deref()).await?;
    let item = resolve::resolve_item(
        &state,
        &drive.id,
        params.item_name.as_deref(),
        params.folder_path.as_deref(),
    )
    .await?;
    let sheet = resolve::resolve_sheet(&state, &drive.id, &item.id, params.sheet_name.as_deref())
        .await?;

    if sheet.name == new_name {
        return Err(
            GatewayError::validation(format!("sheet is already named '{new_name}'")).into(),
        );
    }

    state
        .graph()
        .rename_worksheet(&drive.id, &item.id, &sheet.name, new_name)
        .await?;

    tracing::info!(item = %item.name, old = %sheet.name, new = %new_name, "sheet renamed");
    Ok(RenameSheetResponse {
        item_id: item.id,
        old_name: sheet.name,
        new_name: new_name.to_string(),
    })
}

fn ensure_valid_sheet_name(name: &str) -> Result<(), GatewayError> {
    if name.is_empty() {
        return Err(GatewayError::validation("newName must not be empty"));
    }
    if name.chars().count() > EXCEL_SHEET_NAME_MAX {
        return Err(GatewayError::validation(format!(
            "newName exceeds {EXCEL_SHEET_NAME_MAX} characters"
        )));
    }
    if let Some(bad) = name.chars().find(|c| EXCEL_SHEET_NAME_FORBIDDEN.contains(c)) {
        return Err(GatewayError::validation(format!(
            "newName must not contain '{bad}'"
        )));
    }
    Ok(())
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RenameItemParams {
    #[serde(flatten)]
    pub site: SiteContext,
    pub drive_name: Option<String>,
    pub item_name: Option<String>,
    pub folder_path: Option<String>,
    pub new_name: String,
}

pub async fn rename_item(state: Arc<AppState>, params: RenameItemParams) -> Result<RenameItemResponse> {
    let new_name = params.new_name.trim();
    if new_name.is_empty() {
        return Err(GatewayError::validation("newName must not be empty").into());
    }
    if !state.config().is_supported_workbook(new_name) {
        return Err(GatewayError::validation(format!(
            "newName must keep a workbook extension ({})",
            state.config().supported_extensions.join(", ")
        ))
        .into());
    }

    let drive = resolve::resolve_drive(&state, &params.site, params.drive_name.as_deref()).await?;
    let item = resolve::resolve_item(
        &state,
        &drive.id,
        params.item_name.as_deref(),
        params.folder_path.as_deref(),
    )
    .await?;

    if item.name == new_name {
        return Err(
            GatewayError::validation(format!("item is already named '{new_name}'")).into(),
        );
    }

    state.graph().rename_item(&drive.id, &item.id, new_name).await?;

    tracing::info!(old = %item.name, new = %new_name, "item renamed");
    Ok(RenameItemResponse {
        item_id: item.id,
        old_name: item.name,
        new_name: new_name.to_string(),
    })
}
