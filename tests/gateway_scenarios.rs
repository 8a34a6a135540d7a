//! End-to-end behavior of the operation layer against a seeded backend.

use anyhow::Result;
use assert_matches::assert_matches;
use graphsheet_gateway::errors::GatewayError;
use graphsheet_gateway::model::FindReplaceOutcome;
use graphsheet_gateway::resolve::SiteContext;
use graphsheet_gateway::tools::{
    self, ListDrivesParams, ListItemsParams, ListSheetsParams, ReadRangeParams, RenameSheetParams,
    WriteRangeParams,
};
use serde_json::json;

mod support;

fn two_drive_stub() -> support::StubGraph {
    support::StubGraph::new()
        .with_drive("d1", "Documents")
        .with_drive("d2", "Shared Documents")
        .with_file("d1", "item-1", "budget.xlsx", "/")
        .with_sheet("item-1", "s1", "Sheet1")
        .with_grid(
            "item-1",
            "Sheet1",
            vec![vec![json!("Region"), json!("Total")], vec![json!("EMEA"), json!(1200)]],
        )
}

#[tokio::test(flavor = "current_thread")]
async fn omitted_drive_name_with_two_drives_is_a_400_listing_both() {
    let state = support::app_state(two_drive_stub());

    let err = tools::list_sheets(
        state,
        ListSheetsParams {
            site: SiteContext::default(),
            drive_name: None,
            item_name: Some("budget.xlsx".to_string()),
            folder_path: None,
        },
    )
    .await
    .unwrap_err();

    let gateway = err.downcast_ref::<GatewayError>().expect("typed error");
    assert_eq!(gateway.http_status(), 400);
    let body = gateway.to_body();
    assert_eq!(
        body["availableDrives"],
        json!(["Documents", "Shared Documents"])
    );
}

#[tokio::test(flavor = "current_thread")]
async fn single_sheet_auto_selects_on_read() -> Result<()> {
    let state = support::app_state(two_drive_stub());

    let response = tools::read_range(
        state,
        ReadRangeParams {
            site: SiteContext::default(),
            drive_name: Some("Documents".to_string()),
            item_name: Some("budget.xlsx".to_string()),
            folder_path: None,
            sheet_name: None,
            range: None,
        },
    )
    .await?;

    assert_eq!(response.sheet_name, "Sheet1");
    assert_eq!(response.address.as_deref(), Some("A1:B2"));
    assert_eq!(response.row_count, 2);
    assert_eq!(response.values[1][0], json!("EMEA"));
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn unknown_sheet_is_404_with_available_sheets() {
    let state = support::app_state(two_drive_stub());

    let err = tools::read_range(
        state,
        ReadRangeParams {
            site: SiteContext::default(),
            drive_name: Some("Documents".to_string()),
            item_name: Some("budget.xlsx".to_string()),
            folder_path: None,
            sheet_name: Some("Summary".to_string()),
            range: None,
        },
    )
    .await
    .unwrap_err();

    let gateway = err.downcast_ref::<GatewayError>().expect("typed error");
    assert_eq!(gateway.http_status(), 404);
    assert_eq!(gateway.to_body()["availableSheets"], json!(["Sheet1"]));
}

#[tokio::test(flavor = "current_thread")]
async fn find_replace_defaults_to_a_preview_round_trip() -> Result<()> {
    let (stub, state) = support::shared_state(two_drive_stub());

    let params: tools::FindReplaceParams = serde_json::from_value(json!({
        "driveName": "Documents",
        "itemName": "budget.xlsx",
        "searchTerm": "EMEA",
        "replaceTerm": "Europe"
    }))?;

    let outcome = tools::find_replace(state, params).await?;
    assert_matches!(outcome, FindReplaceOutcome::Preview(preview) => {
        assert!(preview.confirmation_required);
        assert!(!preview.preview_id.is_empty());
        assert_eq!(preview.match_count, 1);
    });
    assert!(stub.writes.lock().is_empty());
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn camel_case_wire_format_reaches_every_param() -> Result<()> {
    let state = support::app_state(two_drive_stub());

    let params: ReadRangeParams = serde_json::from_value(json!({
        "driveName": "Documents",
        "itemName": "budget.xlsx",
        "sheetName": "Sheet1",
        "range": "A1:B1"
    }))?;
    let response = tools::read_range(state, params).await?;
    assert_eq!(response.values, vec![vec![json!("Region"), json!("Total")]]);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn write_validates_dimensions_before_any_graph_call() {
    let (stub, state) = support::shared_state(two_drive_stub());

    let err = tools::write_range(
        state,
        WriteRangeParams {
            site: SiteContext::default(),
            drive_name: Some("Documents".to_string()),
            item_name: Some("budget.xlsx".to_string()),
            folder_path: None,
            sheet_name: None,
            range: "A1:B2".to_string(),
            values: vec![vec![json!(1)]],
        },
    )
    .await
    .unwrap_err();

    assert_matches!(
        err.downcast_ref::<GatewayError>(),
        Some(GatewayError::Validation(_))
    );
    assert!(stub.writes.lock().is_empty());
}

#[tokio::test(flavor = "current_thread")]
async fn write_lands_on_the_resolved_sheet() -> Result<()> {
    let (stub, state) = support::shared_state(two_drive_stub());

    let response = tools::write_range(
        state,
        WriteRangeParams {
            site: SiteContext::default(),
            drive_name: Some("Documents".to_string()),
            item_name: Some("budget.xlsx".to_string()),
            folder_path: None,
            sheet_name: None,
            range: "B2".to_string(),
            values: vec![vec![json!(1300)]],
        },
    )
    .await?;

    assert_eq!(response.cells_written, 1);
    assert_eq!(stub.grid_value("item-1", "Sheet1", "B2"), Some(json!(1300)));
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn rename_sheet_rejects_noop_and_forwards_valid_renames() -> Result<()> {
    let (stub, state) = support::shared_state(two_drive_stub());

    let err = tools::rename_sheet(
        state.clone(),
        RenameSheetParams {
            site: SiteContext::default(),
            drive_name: Some("Documents".to_string()),
            item_name: Some("budget.xlsx".to_string()),
            folder_path: None,
            sheet_name: None,
            new_name: "Sheet1".to_string(),
        },
    )
    .await
    .unwrap_err();
    assert_matches!(
        err.downcast_ref::<GatewayError>(),
        Some(GatewayError::Validation(_))
    );

    let response = tools::rename_sheet(
        state,
        RenameSheetParams {
            site: SiteContext::default(),
            drive_name: Some("Documents".to_string()),
            item_name: Some("budget.xlsx".to_string()),
            folder_path: None,
            sheet_name: None,
            new_name: "FY26".to_string(),
        },
    )
    .await?;
    assert_eq!(response.old_name, "Sheet1");
    assert_eq!(response.new_name, "FY26");
    assert_eq!(
        stub.renamed_sheets.lock().as_slice(),
        &[("Sheet1".to_string(), "FY26".to_string())]
    );
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn format_sends_only_the_requested_facets() -> Result<()> {
    let (stub, state) = support::shared_state(two_drive_stub());

    let params: tools::FormatRangeParams = serde_json::from_value(json!({
        "driveName": "Documents",
        "itemName": "budget.xlsx",
        "range": "A1:B1",
        "bold": true,
        "fillColor": "#ffee00"
    }))?;
    let response = tools::format_range(state, params).await?;
    assert_eq!(response.applied, vec!["font", "fill"]);

    let writes = stub.writes.lock();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0].1, "A1:B1#font");
    assert_eq!(writes[0].2, json!({"bold": true}));
    assert_eq!(writes[1].1, "A1:B1#fill");
    assert_eq!(writes[1].2, json!({"color": "#FFEE00"}));
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn rename_item_keeps_the_workbook_extension() -> Result<()> {
    let (stub, state) = support::shared_state(two_drive_stub());

    let params: tools::RenameItemParams = serde_json::from_value(json!({
        "driveName": "Documents",
        "itemName": "budget.xlsx",
        "newName": "budget-2026.pdf"
    }))?;
    let err = tools::rename_item(state.clone(), params).await.unwrap_err();
    assert_matches!(
        err.downcast_ref::<GatewayError>(),
        Some(GatewayError::Validation(_))
    );

    let params: tools::RenameItemParams = serde_json::from_value(json!({
        "driveName": "Documents",
        "itemName": "budget.xlsx",
        "newName": "budget-2026.xlsx"
    }))?;
    let response = tools::rename_item(state, params).await?;
    assert_eq!(response.old_name, "budget.xlsx");
    assert_eq!(
        stub.renamed_items.lock().as_slice(),
        &[("item-1".to_string(), "budget-2026.xlsx".to_string())]
    );
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn listings_surface_drives_items_and_sheets() -> Result<()> {
    let state = support::app_state(two_drive_stub());

    let drives = tools::list_drives(
        state.clone(),
        ListDrivesParams {
            site: SiteContext::default(),
        },
    )
    .await?;
    assert_eq!(drives.site_id, support::TEST_SITE_ID);
    assert_eq!(drives.drives.len(), 2);

    let items = tools::list_items(
        state.clone(),
        ListItemsParams {
            site: SiteContext::default(),
            drive_name: Some("Documents".to_string()),
            folder_path: None,
            search: None,
        },
    )
    .await?;
    assert_eq!(items.items.len(), 1);
    assert_eq!(items.items[0].name, "budget.xlsx");

    let sheets = tools::list_sheets(
        state,
        ListSheetsParams {
            site: SiteContext::default(),
            drive_name: Some("Documents".to_string()),
            item_name: None,
            folder_path: None,
        },
    )
    .await?;
    assert_eq!(sheets.sheets.len(), 1);
    assert_eq!(sheets.sheets[0].name, "Sheet1");
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn disabled_operations_are_rejected_by_config() {
    let stub = two_drive_stub();
    let config = support::config_with(|cfg| {
        cfg.enabled_tools = Some(["list_drives".to_string()].into_iter().collect());
    });
    let state = support::app_state_with_config(stub, config);

    assert!(state.config().is_tool_enabled("list_drives"));
    assert!(!state.config().is_tool_enabled("write_range"));
}
