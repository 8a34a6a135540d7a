pub mod auth;
pub mod client;
pub mod types;

use crate::errors::GatewayError;
use async_trait::async_trait;

pub use client::GraphClient;
pub use types::{
    Collection, DriveInfo, DriveItemInfo, RangeData, SiteInfo, SiteLocator, WorksheetInfo,
};

/// The slice of Microsoft Graph this gateway talks to. Behind a trait so
/// tests can substitute an in-memory backend for the HTTP client.
#[async_trait]
pub trait GraphApi: Send + Sync {
    async fn resolve_site(&self, locator: &SiteLocator) -> Result<SiteInfo, GatewayError>;

    async fn list_drives(&self, site_id: &str) -> Result<Vec<DriveInfo>, GatewayError>;

    /// Children of a folder; `None` means the drive root.
    async fn list_children(
        &self,
        drive_id: &str,
        folder_id: Option<&str>,
    ) -> Result<Vec<DriveItemInfo>, GatewayError>;

    /// Recursive name search under the drive root.
    async fn search_items(
        &self,
        drive_id: &str,
        query: &str,
    ) -> Result<Vec<DriveItemInfo>, GatewayError>;

    async fn list_worksheets(
        &self,
        drive_id: &str,
        item_id: &str,
    ) -> Result<Vec<WorksheetInfo>, GatewayError>;

    async fn get_range(
        &self,
        drive_id: &str,
        item_id: &str,
        sheet_name: &str,
        address: &str,
    ) -> Result<RangeData, GatewayError>;

    async fn get_used_range(
        &self,
        drive_id: &str,
        item_id: &str,
        sheet_name: &str,
    ) -> Result<RangeData, GatewayError>;

    /// PATCH a range resource, e.g. `{"values": [[...]]}` or
    /// `{"numberFormat": [[...]]}`.
    async fn update_range(
        &self,
        drive_id: &str,
        item_id: &str,
        sheet_name: &str,
        address: &str,
        body: &serde_json::Value,
    ) -> Result<(), GatewayError>;

    async fn update_range_format(
        &self,
        drive_id: &str,
        item_id: &str,
        sheet_name: &str,
        address: &str,
        body: &serde_json::Value,
    ) -> Result<(), GatewayError>;

    async fn update_range_font(
        &self,
        drive_id: &str,
        item_id: &str,
        sheet_name: &str,
        address: &str,
        body: &serde_json::Value,
    ) -> Result<(), GatewayError>;

    async fn update_range_fill(
        &self,
        drive_id: &str,
        item_id: &str,
        sheet_name: &str,
        address: &str,
        body: &serde_json::Value,
    ) -> Result<(), GatewayError>;

    async fn rename_worksheet(
        &self,
        drive_id: &str,
        item_id: &str,
        sheet_name: &str,
        new_name: &str,
    ) -> Result<(), GatewayError>;

    async fn rename_item(
        &self,
        drive_id: &str,
        item_id: &str,
        new_name: &str,
    ) -> Result<(), GatewayError>;
}
