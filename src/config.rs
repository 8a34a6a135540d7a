use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";
const DEFAULT_LOGIN_BASE_URL: &str = "https://login.microsoftonline.com";
const DEFAULT_HTTP_BIND: &str = "127.0.0.1:8085";
const DEFAULT_EXTENSIONS: &[&str] = &["xlsx", "xlsm"];
const DEFAULT_TOOL_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_GRAPH_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_MAX_ITEMS: u64 = 500;
const DEFAULT_RETRY_DELAY_MS: u64 = 750;
const DEFAULT_MAX_LABEL_STEPS: u32 = 8;
const DEFAULT_SITE_CACHE_CAPACITY: usize = 16;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub graph_base_url: String,
    pub login_base_url: String,
    /// Default site context, overridable per request.
    pub site_id: Option<String>,
    pub site_url: Option<String>,
    pub site_hostname: Option<String>,
    pub site_name: Option<String>,
    pub http_bind_address: SocketAddr,
    pub supported_extensions: Vec<String>,
    pub enabled_tools: Option<HashSet<String>>,
    pub tool_timeout_ms: Option<u64>,
    pub graph_timeout_ms: u64,
    pub max_items: Option<u64>,
    pub retry_delay_ms: u64,
    pub max_label_steps: u32,
    pub site_cache_capacity: usize,
}

impl ServerConfig {
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let CliArgs {
            config,
            tenant_id: cli_tenant_id,
            client_id: cli_client_id,
            client_secret: cli_client_secret,
            graph_base_url: cli_graph_base_url,
            login_base_url: cli_login_base_url,
            site_id: cli_site_id,
            site_url: cli_site_url,
            site_hostname: cli_site_hostname,
            site_name: cli_site_name,
            http_bind: cli_http_bind,
            extensions: cli_extensions,
            enabled_tools: cli_enabled_tools,
            tool_timeout_ms: cli_tool_timeout_ms,
            graph_timeout_ms: cli_graph_timeout_ms,
            max_items: cli_max_items,
            retry_delay_ms: cli_retry_delay_ms,
            max_label_steps: cli_max_label_steps,
            site_cache_capacity: cli_site_cache_capacity,
        } = args;

        let file_config = if let Some(path) = config.as_ref() {
            load_config_file(path)?
        } else {
            PartialConfig::default()
        };

        let PartialConfig {
            tenant_id: file_tenant_id,
            client_id: file_client_id,
            client_secret: file_client_secret,
            graph_base_url: file_graph_base_url,
            login_base_url: file_login_base_url,
            site_id: file_site_id,
            site_url: file_site_url,
            site_hostname: file_site_hostname,
            site_name: file_site_name,
            http_bind: file_http_bind,
            extensions: file_extensions,
            enabled_tools: file_enabled_tools,
            tool_timeout_ms: file_tool_timeout_ms,
            graph_timeout_ms: file_graph_timeout_ms,
            max_items: file_max_items,
            retry_delay_ms: file_retry_delay_ms,
            max_label_steps: file_max_label_steps,
            site_cache_capacity: file_site_cache_capacity,
        } = file_config;

        let graph_base_url = cli_graph_base_url
            .or(file_graph_base_url)
            .unwrap_or_else(|| DEFAULT_GRAPH_BASE_URL.to_string());
        let graph_base_url = graph_base_url.trim_end_matches('/').to_string();

        let login_base_url = cli_login_base_url
            .or(file_login_base_url)
            .unwrap_or_else(|| DEFAULT_LOGIN_BASE_URL.to_string());
        let login_base_url = login_base_url.trim_end_matches('/').to_string();

        let http_bind_address = cli_http_bind.or(file_http_bind).unwrap_or_else(|| {
            DEFAULT_HTTP_BIND
                .parse()
                .expect("default bind address valid")
        });

        let mut supported_extensions = cli_extensions
            .or(file_extensions)
            .unwrap_or_else(|| {
                DEFAULT_EXTENSIONS
                    .iter()
                    .map(|ext| (*ext).to_string())
                    .collect()
            })
            .into_iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect::<Vec<_>>();

        supported_extensions.sort();
        supported_extensions.dedup();

        anyhow::ensure!(
            !supported_extensions.is_empty(),
            "at least one workbook extension must be provided"
        );

        let enabled_tools = cli_enabled_tools
            .or(file_enabled_tools)
            .map(|tools| {
                tools
                    .into_iter()
                    .map(|tool| tool.to_ascii_lowercase())
                    .filter(|tool| !tool.is_empty())
                    .collect::<HashSet<_>>()
            })
            .filter(|set| !set.is_empty());

        let tool_timeout_ms = cli_tool_timeout_ms
            .or(file_tool_timeout_ms)
            .unwrap_or(DEFAULT_TOOL_TIMEOUT_MS);
        let tool_timeout_ms = if tool_timeout_ms == 0 {
            None
        } else {
            Some(tool_timeout_ms)
        };

        let graph_timeout_ms = cli_graph_timeout_ms
            .or(file_graph_timeout_ms)
            .unwrap_or(DEFAULT_GRAPH_TIMEOUT_MS)
            .max(1);

        let max_items = cli_max_items.or(file_max_items).unwrap_or(DEFAULT_MAX_ITEMS);
        let max_items = if max_items == 0 { None } else { Some(max_items) };

        let retry_delay_ms = cli_retry_delay_ms
            .or(file_retry_delay_ms)
            .unwrap_or(DEFAULT_RETRY_DELAY_MS);

        let max_label_steps = cli_max_label_steps
            .or(file_max_label_steps)
            .unwrap_or(DEFAULT_MAX_LABEL_STEPS)
            .max(1);

        let site_cache_capacity = cli_site_cache_capacity
            .or(file_site_cache_capacity)
            .unwrap_or(DEFAULT_SITE_CACHE_CAPACITY)
            .max(1);

        let config = Self {
            tenant_id: cli_tenant_id.or(file_tenant_id),
            client_id: cli_client_id.or(file_client_id),
            client_secret: cli_client_secret.or(file_client_secret),
            graph_base_url,
            login_base_url,
            site_id: cli_site_id.or(file_site_id),
            site_url: cli_site_url.or(file_site_url),
            site_hostname: cli_site_hostname.or(file_site_hostname),
            site_name: cli_site_name.or(file_site_name),
            http_bind_address,
            supported_extensions,
            enabled_tools,
            tool_timeout_ms,
            graph_timeout_ms,
            max_items,
            retry_delay_ms,
            max_label_steps,
            site_cache_capacity,
        };

        config.ensure_credentials()?;
        Ok(config)
    }

    /// The credential triple is mandatory against the real Graph endpoint.
    /// A non-default `graph_base_url` means a stub/test deployment, which may
    /// run without it.
    pub fn ensure_credentials(&self) -> Result<()> {
        if self.graph_base_url != DEFAULT_GRAPH_BASE_URL {
            return Ok(());
        }
        anyhow::ensure!(
            self.tenant_id.is_some() && self.client_id.is_some() && self.client_secret.is_some(),
            "tenant_id, client_id and client_secret are required (flags or GRAPHSHEET_* env)"
        );
        Ok(())
    }

    pub fn is_tool_enabled(&self, tool: &str) -> bool {
        match &self.enabled_tools {
            Some(set) => set.contains(&tool.to_ascii_lowercase()),
            None => true,
        }
    }

    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout_ms.map(Duration::from_millis)
    }

    pub fn graph_timeout(&self) -> Duration {
        Duration::from_millis(self.graph_timeout_ms)
    }

    pub fn max_items(&self) -> Option<usize> {
        self.max_items.map(|items| items as usize)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn is_supported_workbook(&self, file_name: &str) -> bool {
        Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .map(|ext| self.supported_extensions.contains(&ext))
            .unwrap_or(false)
    }
}

#[derive(Parser, Debug, Default, Clone)]
#[command(
    name = "graphsheet-gateway",
    about = "REST gateway for Excel workbooks in SharePoint/OneDrive via Microsoft Graph",
    version
)]
pub struct CliArgs {
    #[arg(
        long,
        value_name = "FILE",
        help = "Path to a configuration file (YAML or JSON)",
        global = true
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        env = "GRAPHSHEET_TENANT_ID",
        value_name = "ID",
        help = "Entra ID tenant for the client-credentials grant"
    )]
    pub tenant_id: Option<String>,

    #[arg(
        long,
        env = "GRAPHSHEET_CLIENT_ID",
        value_name = "ID",
        help = "App registration client id"
    )]
    pub client_id: Option<String>,

    #[arg(
        long,
        env = "GRAPHSHEET_CLIENT_SECRET",
        value_name = "SECRET",
        hide_env_values = true,
        help = "App registration client secret"
    )]
    pub client_secret: Option<String>,

    #[arg(
        long,
        env = "GRAPHSHEET_GRAPH_BASE_URL",
        value_name = "URL",
        help = "Graph API base URL (override for stub deployments)"
    )]
    pub graph_base_url: Option<String>,

    #[arg(
        long,
        env = "GRAPHSHEET_LOGIN_BASE_URL",
        value_name = "URL",
        help = "Token endpoint base URL"
    )]
    pub login_base_url: Option<String>,

    #[arg(
        long,
        env = "GRAPHSHEET_SITE_ID",
        value_name = "ID",
        help = "Default SharePoint site id"
    )]
    pub site_id: Option<String>,

    #[arg(
        long,
        env = "GRAPHSHEET_SITE_URL",
        value_name = "URL",
        help = "Default SharePoint site URL, e.g. https://contoso.sharepoint.com/sites/Finance"
    )]
    pub site_url: Option<String>,

    #[arg(
        long,
        env = "GRAPHSHEET_SITE_HOSTNAME",
        value_name = "HOST",
        help = "Default SharePoint hostname, e.g. contoso.sharepoint.com"
    )]
    pub site_hostname: Option<String>,

    #[arg(
        long,
        env = "GRAPHSHEET_SITE_NAME",
        value_name = "NAME",
        help = "Default site name under /sites/ on the configured hostname"
    )]
    pub site_name: Option<String>,

    #[arg(
        long,
        env = "GRAPHSHEET_HTTP_BIND",
        value_name = "ADDR",
        help = "HTTP bind address"
    )]
    pub http_bind: Option<SocketAddr>,

    #[arg(
        long,
        env = "GRAPHSHEET_EXTENSIONS",
        value_name = "EXT",
        value_delimiter = ',',
        help = "Comma-separated list of workbook extensions listed as items"
    )]
    pub extensions: Option<Vec<String>>,

    #[arg(
        long,
        env = "GRAPHSHEET_ENABLED_TOOLS",
        value_name = "TOOL",
        value_delimiter = ',',
        help = "Restrict execution to the provided operation names"
    )]
    pub enabled_tools: Option<Vec<String>>,

    #[arg(
        long,
        env = "GRAPHSHEET_TOOL_TIMEOUT_MS",
        value_name = "MS",
        help = "Per-operation timeout in milliseconds (default: 30000; 0 disables)",
        value_parser = clap::value_parser!(u64)
    )]
    pub tool_timeout_ms: Option<u64>,

    #[arg(
        long,
        env = "GRAPHSHEET_GRAPH_TIMEOUT_MS",
        value_name = "MS",
        help = "Outbound Graph request timeout in milliseconds (default: 15000)",
        value_parser = clap::value_parser!(u64)
    )]
    pub graph_timeout_ms: Option<u64>,

    #[arg(
        long,
        env = "GRAPHSHEET_MAX_ITEMS",
        value_name = "N",
        help = "Max entries per listing or match payload (default: 500; 0 disables)",
        value_parser = clap::value_parser!(u64)
    )]
    pub max_items: Option<u64>,

    #[arg(
        long,
        env = "GRAPHSHEET_RETRY_DELAY_MS",
        value_name = "MS",
        help = "Fixed delay before the single empty-listing retry (default: 750)",
        value_parser = clap::value_parser!(u64)
    )]
    pub retry_delay_ms: Option<u64>,

    #[arg(
        long,
        env = "GRAPHSHEET_MAX_LABEL_STEPS",
        value_name = "N",
        help = "Upper clamp for label-neighbor step bounds (default: 8)",
        value_parser = clap::value_parser!(u32)
    )]
    pub max_label_steps: Option<u32>,

    #[arg(
        long,
        env = "GRAPHSHEET_SITE_CACHE_CAPACITY",
        value_name = "N",
        help = "Resolved site ids kept in memory (default: 16)",
        value_parser = clap::value_parser!(usize)
    )]
    pub site_cache_capacity: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    tenant_id: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    graph_base_url: Option<String>,
    login_base_url: Option<String>,
    site_id: Option<String>,
    site_url: Option<String>,
    site_hostname: Option<String>,
    site_name: Option<String>,
    http_bind: Option<SocketAddr>,
    extensions: Option<Vec<String>>,
    enabled_tools: Option<Vec<String>>,
    tool_timeout_ms: Option<u64>,
    graph_timeout_ms: Option<u64>,
    max_items: Option<u64>,
    retry_delay_ms: Option<u64>,
    max_label_steps: Option<u32>,
    site_cache_capacity: Option<usize>,
}

fn load_config_file(path: &Path) -> Result<PartialConfig> {
    if !path.exists() {
        anyhow::bail!("config file {:?} does not exist", path);
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {:?}", path))?;
    let ext = path
        .extension()
        .and_then(|os| os.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let parsed = match ext.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse YAML config {:?}", path))?,
        "json" => serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse JSON config {:?}", path))?,
        other => anyhow::bail!("unsupported config extension: {other}"),
    };
    Ok(parsed)
}
