use serde::Deserialize;

/// Graph wraps every listing in a `{"value": [...]}` envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct Collection<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
}

/// How to address a site before its id is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteLocator {
    Id(String),
    /// Root site of a hostname.
    Host(String),
    /// Server-relative path under a hostname, e.g. `/sites/Finance`.
    ServerRelative { hostname: String, path: String },
    Root,
}

impl SiteLocator {
    /// Cache key; distinct locators must not collide.
    pub fn cache_key(&self) -> String {
        match self {
            Self::Id(id) => format!("id:{id}"),
            Self::Host(host) => format!("host:{host}"),
            Self::ServerRelative { hostname, path } => format!("rel:{hostname}:{path}"),
            Self::Root => "root".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteInfo {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub web_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DriveInfo {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentReference {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileFacet {
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderFacet {
    #[serde(default)]
    pub child_count: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveItemInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub parent_reference: Option<ParentReference>,
    #[serde(default)]
    pub file: Option<FileFacet>,
    #[serde(default)]
    pub folder: Option<FolderFacet>,
}

impl DriveItemInfo {
    pub fn is_folder(&self) -> bool {
        self.folder.is_some()
    }

    pub fn is_file(&self) -> bool {
        self.file.is_some()
    }

    /// Human-readable parent path with Graph's `/drive/root:` prefix removed.
    pub fn parent_path(&self) -> Option<String> {
        let raw = self.parent_reference.as_ref()?.path.as_deref()?;
        let cleaned = match raw.split_once("root:") {
            Some((_, rest)) if !rest.is_empty() => rest.to_string(),
            Some(_) => "/".to_string(),
            None => raw.to_string(),
        };
        Some(cleaned)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorksheetInfo {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeData {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub values: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    pub row_count: Option<u64>,
    #[serde(default)]
    pub column_count: Option<u64>,
}

impl RangeData {
    /// Graph addresses come back qualified (`Sheet1!A1:C4`); strip the sheet.
    pub fn local_address(&self) -> Option<&str> {
        let address = self.address.as_deref()?;
        Some(match address.rsplit_once('!') {
            Some((_, local)) => local,
            None => address,
        })
    }
}
