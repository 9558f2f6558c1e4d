mod report;

use std::collections::HashMap;
use std::path::Path;

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde::Deserialize;
use storescore_core::{normalize_email, Analysis, Db, Store, StoreView, User};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

// --- Request types ---

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
struct ListStoresRequest {
    /// Only list stores owned by this account email
    owner_email: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
struct StoreRequest {
    /// Store id as returned by list_stores
    store_id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
struct AnalysisRequest {
    /// Analysis id as returned by list_analyses
    analysis_id: String,
}

// --- Server ---

#[derive(Clone)]
pub struct StoreScoreServer {
    db: Db,
    tool_router: ToolRouter<Self>,
}

fn text_result(result: Result<String, String>) -> Result<CallToolResult, McpError> {
    match result {
        Ok(text) => Ok(CallToolResult::success(vec![Content::text(text)])),
        Err(e) => Ok(CallToolResult::error(vec![Content::text(e)])),
    }
}

fn newest_first<T>(items: &mut [T], created: impl Fn(&T) -> chrono::DateTime<chrono::Utc>) {
    items.sort_by(|a, b| created(b).cmp(&created(a)));
}

impl StoreScoreServer {
    fn load_store(&self, id: &str) -> Result<Store, String> {
        match self.db.get::<Store>(id) {
            Ok(Some(store)) => Ok(store),
            Ok(None) => Err(format!("No store with id '{}'", id)),
            Err(e) => Err(format!("Failed to read store '{}': {}", id, e)),
        }
    }

    fn store_analyses(&self, store_id: &str) -> Result<Vec<Analysis>, String> {
        let mut analyses = self
            .db
            .find::<Analysis, _>(|a| a.store_id == store_id)
            .map_err(|e| format!("Failed to read analyses: {}", e))?;
        newest_first(&mut analyses, |a| a.created_at);
        Ok(analyses)
    }

    fn list_stores_text(&self, owner_email: Option<&str>) -> Result<String, String> {
        let users = self
            .db
            .list::<User>()
            .map_err(|e| format!("Failed to read users: {}", e))?;
        let emails: HashMap<&str, &str> = users
            .iter()
            .map(|u| (u.id.as_str(), u.email.as_str()))
            .collect();

        let owner_id = match owner_email.map(normalize_email) {
            Some(email) => match users.iter().find(|u| u.email == email) {
                Some(u) => Some(u.id.clone()),
                None => return Err(format!("No account with email '{}'", email)),
            },
            None => None,
        };

        let mut stores = self
            .db
            .find::<Store, _>(|s| owner_id.as_ref().map_or(true, |id| &s.owner_id == id))
            .map_err(|e| format!("Failed to read stores: {}", e))?;
        if stores.is_empty() {
            return Ok("No stores found.".to_string());
        }
        newest_first(&mut stores, |s| s.created_at);
        Ok(stores
            .iter()
            .map(|s| report::store_line(s, emails.get(s.owner_id.as_str()).copied()))
            .collect::<Vec<_>>()
            .join("\n"))
    }

    fn get_store_text(&self, store_id: &str) -> Result<String, String> {
        let store = self.load_store(store_id)?;
        let analyses = self.store_analyses(store_id)?;
        let owner_email = self
            .db
            .get::<User>(&store.owner_id)
            .ok()
            .flatten()
            .map(|u| u.email);
        let body = serde_json::json!({
            "store": StoreView::from(&store),
            "ownerEmail": owner_email,
            "analysisCount": analyses.len(),
        });
        serde_json::to_string_pretty(&body).map_err(|e| format!("Serialization error: {}", e))
    }

    fn list_analyses_text(&self, store_id: &str) -> Result<String, String> {
        self.load_store(store_id)?;
        let analyses = self.store_analyses(store_id)?;
        if analyses.is_empty() {
            return Ok("No analyses for this store yet.".to_string());
        }
        Ok(analyses
            .iter()
            .map(report::analysis_line)
            .collect::<Vec<_>>()
            .join("\n"))
    }

    fn get_analysis_text(&self, analysis_id: &str) -> Result<String, String> {
        match self.db.get::<Analysis>(analysis_id) {
            Ok(Some(a)) => serde_json::to_string_pretty(&a)
                .map_err(|e| format!("Serialization error: {}", e)),
            Ok(None) => Err(format!("No analysis with id '{}'", analysis_id)),
            Err(e) => Err(format!("Failed to read analysis '{}': {}", analysis_id, e)),
        }
    }

    fn compare_text(&self, store_id: &str) -> Result<String, String> {
        self.load_store(store_id)?;
        let analyses = self.store_analyses(store_id)?;
        let (previous, latest) = report::latest_two_completed(analyses)
            .ok_or_else(|| "Comparison needs at least two completed analyses.".to_string())?;
        Ok(report::compare(&previous, &latest).render())
    }
}

#[tool_router]
impl StoreScoreServer {
    pub fn new(db: Db) -> Self {
        Self {
            db,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        description = "List stores with their latest score and grade, newest first. Optionally filter by owner email."
    )]
    fn list_stores(
        &self,
        Parameters(req): Parameters<ListStoresRequest>,
    ) -> Result<CallToolResult, McpError> {
        text_result(self.list_stores_text(req.owner_email.as_deref()))
    }

    #[tool(description = "Get one store as JSON with its owner email and number of analyses")]
    fn get_store(&self, Parameters(req): Parameters<StoreRequest>) -> Result<CallToolResult, McpError> {
        text_result(self.get_store_text(&req.store_id))
    }

    #[tool(description = "List a store's analyses, newest first, with status and overall score")]
    fn list_analyses(
        &self,
        Parameters(req): Parameters<StoreRequest>,
    ) -> Result<CallToolResult, McpError> {
        text_result(self.list_analyses_text(&req.store_id))
    }

    #[tool(
        description = "Get the full JSON of an analysis: overall score, grade, summary and per-category scores with recommendations"
    )]
    fn get_analysis(
        &self,
        Parameters(req): Parameters<AnalysisRequest>,
    ) -> Result<CallToolResult, McpError> {
        text_result(self.get_analysis_text(&req.analysis_id))
    }

    #[tool(
        description = "Compare the two most recent completed analyses of a store. Returns the overall and per-category score changes."
    )]
    fn compare_analyses(
        &self,
        Parameters(req): Parameters<StoreRequest>,
    ) -> Result<CallToolResult, McpError> {
        text_result(self.compare_text(&req.store_id))
    }

    #[tool(description = "Get the scoring rubric: categories, weights and the score scale")]
    fn get_rubric(&self) -> Result<CallToolResult, McpError> {
        Ok(CallToolResult::success(vec![Content::text(
            storescore_core::rubric::rubric(),
        )]))
    }
}

#[tool_handler]
impl ServerHandler for StoreScoreServer {
    fn get_info(&self) -> ServerInfo {
        let instructions = format!(
            "{}\n\n## Scoring Rubric\n{}",
            INSTRUCTIONS,
            storescore_core::rubric::rubric()
        );
        ServerInfo {
            instructions: Some(instructions.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

const INSTRUCTIONS: &str = r#"StoreScore scores e-commerce storefronts (Shopify and eBay) across six weighted categories and keeps every analysis.

Start with `list_stores` to find a store id, then `list_analyses` for its history. `get_analysis` returns the full scorecard with recommendations. `compare_analyses` shows what moved between the last two completed runs.

This server is read-only. New analyses are started from the StoreScore dashboard."#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // stdout carries the MCP protocol
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if std::env::args().nth(1).as_deref() == Some("init") {
        return init_project();
    }

    let root = storescore_core::data_dir();
    info!("serving records from {}", root.display());
    let db = Db::open(root)?;

    let service = StoreScoreServer::new(db)
        .serve(rmcp::transport::io::stdio())
        .await
        .inspect_err(|e| error!("MCP server error: {}", e))?;
    service.waiting().await?;
    Ok(())
}

/// Register this binary with Claude Code (`.mcp.json`) and Codex
/// (`.codex/config.toml`) in the current directory.
fn init_project() -> Result<(), Box<dyn std::error::Error>> {
    let binary_path = std::env::current_exe()?
        .canonicalize()?
        .to_string_lossy()
        .to_string();
    let cwd = std::env::current_dir()?;

    init_claude_code(&cwd, &binary_path)?;
    init_codex(&cwd, &binary_path)?;
    eprintln!("\nDone. Claude Code and Codex will see StoreScore in this project.");
    Ok(())
}

/// Write .mcp.json for Claude Code, merging with any existing config.
fn init_claude_code(cwd: &Path, binary_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mcp_json_path = cwd.join(".mcp.json");
    let mut root: serde_json::Value = if mcp_json_path.exists() {
        let contents = std::fs::read_to_string(&mcp_json_path)?;
        serde_json::from_str(&contents).map_err(|e| {
            format!("{} is not valid JSON ({e}); fix or remove it first", mcp_json_path.display())
        })?
    } else {
        serde_json::json!({})
    };

    let Some(entries) = root.as_object_mut() else {
        return Err(format!("{} must hold a JSON object", mcp_json_path.display()).into());
    };
    let servers = entries
        .entry("mcpServers")
        .or_insert_with(|| serde_json::json!({}));
    if !servers.is_object() {
        return Err(format!("mcpServers in {} must be an object", mcp_json_path.display()).into());
    }
    root["mcpServers"]["storescore"] = serde_json::json!({
        "type": "stdio",
        "command": binary_path,
        "args": [],
    });

    std::fs::write(&mcp_json_path, serde_json::to_string_pretty(&root)?)?;
    eprintln!("Wrote {}", mcp_json_path.display());
    Ok(())
}

/// Write .codex/config.toml for OpenAI Codex, merging with any existing config.
fn init_codex(cwd: &Path, binary_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let codex_dir = cwd.join(".codex");
    let config_toml_path = codex_dir.join("config.toml");

    let mut doc: toml_edit::DocumentMut = if config_toml_path.exists() {
        std::fs::read_to_string(&config_toml_path)?
            .parse::<toml_edit::DocumentMut>()
            .map_err(|e| {
                format!("{} is not valid TOML ({e}); fix or remove it first", config_toml_path.display())
            })?
    } else {
        toml_edit::DocumentMut::new()
    };

    if !doc.contains_key("mcp_servers") {
        doc["mcp_servers"] = toml_edit::Item::Table(toml_edit::Table::new());
    } else if !doc.contains_table("mcp_servers") {
        return Err(format!("mcp_servers in {} must be a table", config_toml_path.display()).into());
    }

    let mut server = toml_edit::Table::new();
    server.insert("command", toml_edit::value(binary_path));
    server.insert("args", toml_edit::value(toml_edit::Array::new()));
    doc["mcp_servers"]["storescore"] = toml_edit::Item::Table(server);

    std::fs::create_dir_all(&codex_dir)?;
    std::fs::write(&config_toml_path, doc.to_string())?;
    eprintln!("Wrote {}", config_toml_path.display());
    Ok(())
}
