use super::auth::AuthManager;
use super::types::{
    Collection, DriveInfo, DriveItemInfo, RangeData, SiteInfo, SiteLocator, WorksheetInfo,
};
use super::GraphApi;
use crate::config::ServerConfig;
use crate::errors::{GatewayError, UpstreamCategory};
use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

const LIST_PAGE_SIZE: u32 = 500;

/// reqwest-backed Graph client. Every request carries a cached bearer token;
/// a 401 forces one token refresh and exactly one retry, nothing more.
pub struct GraphClient {
    http: reqwest::Client,
    base_url: String,
    auth: AuthManager,
}

impl GraphClient {
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.graph_timeout())
            .build()?;
        let auth = AuthManager::new(config, http.clone());
        Ok(Self {
            http,
            base_url: config.graph_base_url.clone(),
            auth,
        })
    }

    async fn dispatch(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        token: &str,
    ) -> Result<reqwest::Response, GatewayError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.http.request(method, &url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }
        request.send().await.map_err(GatewayError::transport)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<reqwest::Response, GatewayError> {
        let token = self.auth.bearer_token().await?;
        let response = self.dispatch(method.clone(), path, body, &token).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            tracing::debug!(path, "graph returned 401, refreshing token and retrying once");
            let token = self.auth.force_refresh().await?;
            return self.dispatch(method, path, body, &token).await;
        }

        Ok(response)
    }

    async fn error_from(response: reqwest::Response) -> GatewayError {
        let status = response.status().as_u16();
        let category = UpstreamCategory::classify(status);
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        let message = match response.json::<Value>().await {
            Ok(body) => body
                .pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(|m| m.to_string())
                .unwrap_or_else(|| format!("graph returned status {status}")),
            Err(_) => format!("graph returned status {status}"),
        };

        let message = match retry_after {
            Some(seconds) if category == UpstreamCategory::Throttled => {
                format!("{message} (retry after {seconds}s)")
            }
            _ => message,
        };

        GatewayError::Upstream {
            category,
            status: Some(status),
            message,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        let response = self.send(Method::GET, path, None).await?;
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }
        response.json().await.map_err(GatewayError::transport)
    }

    async fn patch(&self, path: &str, body: &Value) -> Result<(), GatewayError> {
        let response = self.send(Method::PATCH, path, Some(body)).await?;
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }
        Ok(())
    }

    fn worksheet_path(drive_id: &str, item_id: &str, sheet_name: &str) -> String {
        format!(
            "/drives/{drive_id}/items/{item_id}/workbook/worksheets/{}",
            urlencoding::encode(sheet_name)
        )
    }

    fn range_path(drive_id: &str, item_id: &str, sheet_name: &str, address: &str) -> String {
        format!(
            "{}/range(address='{}')",
            Self::worksheet_path(drive_id, item_id, sheet_name),
            urlencoding::encode(address)
        )
    }
}

#[async_trait]
impl GraphApi for GraphClient {
    async fn resolve_site(&self, locator: &SiteLocator) -> Result<SiteInfo, GatewayError> {
        let path = match locator {
            SiteLocator::Id(id) => format!("/sites/{id}"),
            SiteLocator::Host(hostname) => format!("/sites/{hostname}"),
            SiteLocator::ServerRelative { hostname, path } => {
                // Colons and slashes are structural in the sites addressing
                // scheme; only the individual segments get encoded.
                let encoded = path
                    .split('/')
                    .map(|segment| urlencoding::encode(segment).into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                format!("/sites/{hostname}:{encoded}")
            }
            SiteLocator::Root => "/sites/root".to_string(),
        };
        self.get_json(&path).await
    }

    async fn list_drives(&self, site_id: &str) -> Result<Vec<DriveInfo>, GatewayError> {
        let collection: Collection<DriveInfo> =
            self.get_json(&format!("/sites/{site_id}/drives")).await?;
        Ok(collection.value)
    }

    async fn list_children(
        &self,
        drive_id: &str,
        folder_id: Option<&str>,
    ) -> Result<Vec<DriveItemInfo>, GatewayError> {
        let path = match folder_id {
            Some(folder_id) => format!(
                "/drives/{drive_id}/items/{folder_id}/children?$top={LIST_PAGE_SIZE}"
            ),
            None => format!("/drives/{drive_id}/root/children?$top={LIST_PAGE_SIZE}"),
        };
        let collection: Collection<DriveItemInfo> = self.get_json(&path).await?;
        Ok(collection.value)
    }

    async fn search_items(
        &self,
        drive_id: &str,
        query: &str,
    ) -> Result<Vec<DriveItemInfo>, GatewayError> {
        // Single quotes are the OData string delimiter; double them.
        let escaped = query.replace('\'', "''");
        let path = format!(
            "/drives/{drive_id}/root/search(q='{}')?$top={LIST_PAGE_SIZE}",
            urlencoding::encode(&escaped)
        );
        let collection: Collection<DriveItemInfo> = self.get_json(&path).await?;
        Ok(collection.value)
    }

    async fn list_worksheets(
        &self,
        drive_id: &str,
        item_id: &str,
    ) -> Result<Vec<WorksheetInfo>, GatewayError> {
        let collection: Collection<WorksheetInfo> = self
            .get_json(&format!(
                "/drives/{drive_id}/items/{item_id}/workbook/worksheets"
            ))
            .await?;
        Ok(collection.value)
    }

    async fn get_range(
        &self,
        drive_id: &str,
        item_id: &str,
        sheet_name: &str,
        address: &str,
    ) -> Result<RangeData, GatewayError> {
        self.get_json(&Self::range_path(drive_id, item_id, sheet_name, address))
            .await
    }

    async fn get_used_range(
        &self,
        drive_id: &str,
        item_id: &str,
        sheet_name: &str,
    ) -> Result<RangeData, GatewayError> {
        self.get_json(&format!(
            "{}/usedRange",
            Self::worksheet_path(drive_id, item_id, sheet_name)
        ))
        .await
    }

    async fn update_range(
        &self,
        drive_id: &str,
        item_id: &str,
        sheet_name: &str,
        address: &str,
        body: &Value,
    ) -> Result<(), GatewayError> {
        self.patch(
            &Self::range_path(drive_id, item_id, sheet_name, address),
            body,
        )
        .await
    }

    async fn update_range_format(
        &self,
        drive_id: &str,
        item_id: &str,
        sheet_name: &str,
        address: &str,
        body: &Value,
    ) -> Result<(), GatewayError> {
        self.patch(
            &format!(
                "{}/format",
                Self::range_path(drive_id, item_id, sheet_name, address)
            ),
            body,
        )
        .await
    }

    async fn update_range_font(
        &self,
        drive_id: &str,
        item_id: &str,
        sheet_name: &str,
        address: &str,
        body: &Value,
    ) -> Result<(), GatewayError> {
        self.patch(
            &format!(
                "{}/format/font",
                Self::range_path(drive_id, item_id, sheet_name, address)
            ),
            body,
        )
        .await
    }

    async fn update_range_fill(
        &self,
        drive_id: &str,
        item_id: &str,
        sheet_name: &str,
        address: &str,
        body: &Value,
    ) -> Result<(), GatewayError> {
        self.patch(
            &format!(
                "{}/format/fill",
                Self::range_path(drive_id, item_id, sheet_name, address)
            ),
            body,
        )
        .await
    }

    async fn rename_worksheet(
        &self,
        drive_id: &str,
        item_id: &str,
        sheet_name: &str,
        new_name: &str,
    ) -> Result<(), GatewayError> {
        self.patch(
            &Self::worksheet_path(drive_id, item_id, sheet_name),
            &serde_json::json!({ "name": new_name }),
        )
        .await
    }

    async fn rename_item(
        &self,
        drive_id: &str,
        item_id: &str,
        new_name: &str,
    ) -> Result<(), GatewayError> {
        self.patch(
            &format!("/drives/{drive_id}/items/{item_id}"),
            &serde_json::json!({ "name": new_name }),
        )
        .await
    }
}
