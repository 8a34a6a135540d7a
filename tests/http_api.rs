//! The REST surface end-to-end: real HTTP requests against the router.

use anyhow::Result;
use graphsheet_gateway::server::GatewayServer;
use graphsheet_gateway::state::AppState;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;

mod support;

async fn serve(state: Arc<AppState>) -> SocketAddr {
    let router = GatewayServer::from_state(state).router();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

fn seeded_state() -> Arc<AppState> {
    support::app_state(
        support::StubGraph::new()
            .with_drive("d1", "Documents")
            .with_drive("d2", "Shared Documents")
            .with_file("d1", "item-1", "budget.xlsx", "/")
            .with_sheet("item-1", "s1", "Sheet1")
            .with_grid(
                "item-1",
                "Sheet1",
                vec![vec![json!("old"), json!("keep")]],
            ),
    )
}

#[tokio::test]
async fn preview_returns_409_with_matches_and_preview_id() -> Result<()> {
    let addr = serve(seeded_state()).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{addr}/find-replace"))
        .json(&json!({
            "driveName": "Documents",
            "itemName": "budget.xlsx",
            "searchTerm": "old",
            "replaceTerm": "new"
        }))
        .send()
        .await?;

    assert_eq!(response.status().as_u16(), 409);
    let body: Value = response.json().await?;
    assert_eq!(body["confirmationRequired"], json!(true));
    assert_eq!(body["matchCount"], json!(1));
    assert!(body["previewId"].as_str().unwrap().starts_with("prv_"));
    assert_eq!(body["matches"][0]["currentValue"], json!("old"));
    Ok(())
}

#[tokio::test]
async fn omitted_drive_name_yields_400_with_available_drives() -> Result<()> {
    let addr = serve(seeded_state()).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{addr}/read"))
        .json(&json!({ "itemName": "budget.xlsx" }))
        .send()
        .await?;

    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await?;
    assert_eq!(
        body["availableDrives"],
        json!(["Documents", "Shared Documents"])
    );
    Ok(())
}

#[tokio::test]
async fn ambiguous_item_yields_409_with_disambiguating_matches() -> Result<()> {
    let state = support::app_state(
        support::StubGraph::new()
            .with_drive("d1", "Documents")
            .with_file("d1", "i1", "budget.xlsx", "/Finance")
            .with_file("d1", "i2", "budget.xlsx", "/Archive"),
    );
    let addr = serve(state).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!(
            "http://{addr}/sheets?driveName=Documents&itemName=budget.xlsx"
        ))
        .send()
        .await?;

    assert_eq!(response.status().as_u16(), 409);
    let body: Value = response.json().await?;
    let matches = body["matches"].as_array().unwrap();
    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0]["path"], json!("/Finance"));
    Ok(())
}

#[tokio::test]
async fn listings_work_over_query_parameters() -> Result<()> {
    let addr = serve(seeded_state()).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("http://{addr}/drives"))
        .send()
        .await?;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await?;
    assert_eq!(body["drives"].as_array().unwrap().len(), 2);

    let response = client
        .get(format!("http://{addr}/items?driveName=Shared%20Documents"))
        .send()
        .await?;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await?;
    assert_eq!(body["items"].as_array().unwrap().len(), 0);
    Ok(())
}

#[tokio::test]
async fn disabled_operation_is_403() -> Result<()> {
    let config = support::config_with(|cfg| {
        cfg.enabled_tools = Some(["list_drives".to_string()].into_iter().collect());
    });
    let state = support::app_state_with_config(
        support::StubGraph::new().with_drive("d1", "Documents"),
        config,
    );
    let addr = serve(state).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{addr}/find-replace"))
        .json(&json!({ "searchTerm": "x", "replaceTerm": "y" }))
        .send()
        .await?;
    assert_eq!(response.status().as_u16(), 403);
    Ok(())
}

#[tokio::test]
async fn healthz_is_open() -> Result<()> {
    let addr = serve(seeded_state()).await;
    let body: Value = reqwest::get(format!("http://{addr}/healthz"))
        .await?
        .json()
        .await?;
    assert_eq!(body["status"], json!("ok"));
    Ok(())
}
