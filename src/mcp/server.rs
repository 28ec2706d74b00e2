use std::sync::Arc;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{
    AnnotateAble, Implementation, ListResourcesResult, PaginatedRequestParam, ProtocolVersion,
    RawResource, ReadResourceRequestParam, ReadResourceResult, ResourceContents,
    ServerCapabilities, ServerInfo,
};
use rmcp::service::RequestContext;
use rmcp::{
    ErrorData as McpError, Json, RoleServer, ServerHandler, ServiceExt, tool, tool_handler,
    tool_router,
};

use crate::api::{self, SnapshotQuery};
use crate::app::App;
use crate::config::Config;
use crate::store::RecordStore;
use crate::types::Team;

use super::types::*;

/// Resource URI prefix; one resource per team serves today's snapshot.
const TODAY_URI_PREFIX: &str = "rosterboard://today/";

fn today_uri(team: Team) -> String {
    format!("{TODAY_URI_PREFIX}{team}")
}

/// The rosterboard MCP server: read-only access to published snapshots.
#[derive(Clone)]
pub struct RosterboardMcpServer {
    tool_router: ToolRouter<Self>,
    app: Arc<App>,
}

impl RosterboardMcpServer {
    pub fn new(app: Arc<App>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            app,
        }
    }

    /// Runs a blocking store read off the async runtime.
    async fn blocking<T, F>(&self, f: F) -> Result<T, McpError>
    where
        T: Send + 'static,
        F: FnOnce(&App) -> T + Send + 'static,
    {
        let app = self.app.clone();
        tokio::task::spawn_blocking(move || f(&app))
            .await
            .map_err(|e| McpError::internal_error(format!("Store read failed: {e}"), None))
    }

    fn team_summary(app: &App, team: Team) -> TeamSummary {
        let periods = app.schedules.list_periods(team).unwrap_or_else(|e| {
            tracing::warn!(team = %team, "could not list rosters: {e}");
            Vec::new()
        });
        TeamSummary {
            name: team.to_string(),
            has_legend: app.legends.exists(team),
            roster_count: periods.len(),
            roster_months: periods.iter().map(|p| p.year_month()).collect(),
        }
    }
}

#[tool_router]
impl RosterboardMcpServer {
    #[tool(
        name = "get_daily_snapshot",
        description = "Get who is on day, night and vacation shift for a team on a date. Returns status \"ok\" with data, or status \"error\" with a message."
    )]
    async fn get_daily_snapshot(
        &self,
        Parameters(req): Parameters<GetDailySnapshotRequest>,
    ) -> Result<Json<SnapshotResponse>, String> {
        let response = self
            .blocking(move |app| {
                let date = req
                    .date
                    .unwrap_or_else(|| app.today().format(api::DATE_FORMAT).to_string());
                let query = SnapshotQuery::new(req.team, date);
                api::ApiResponse::from_result(api::get_snapshot(&app.snapshots, &query))
            })
            .await
            .map_err(|e| e.to_string())?;

        Ok(Json(SnapshotResponse::from(&response)))
    }

    #[tool(
        name = "list_teams",
        description = "List all teams with the months that have an uploaded roster and whether a shift legend exists."
    )]
    async fn list_teams(
        &self,
        Parameters(_req): Parameters<ListTeamsRequest>,
    ) -> Result<Json<TeamListResponse>, String> {
        let teams = self
            .blocking(|app| {
                Team::all()
                    .iter()
                    .map(|team| Self::team_summary(app, *team))
                    .collect::<Vec<_>>()
            })
            .await
            .map_err(|e| e.to_string())?;

        Ok(Json(TeamListResponse { teams }))
    }
}

#[tool_handler]
impl ServerHandler for RosterboardMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            server_info: Implementation {
                name: "rosterboard".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: Some("Rosterboard".to_string()),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Rosterboard MCP Server - shift rosters of operations teams. \
                 Query the day/night/vacation board of a team for any published date."
                    .to_string(),
            ),
        }
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        Ok(ListResourcesResult {
            resources: Team::all()
                .iter()
                .map(|team| {
                    RawResource::new(today_uri(*team), format!("{team} today")).no_annotation()
                })
                .collect(),
            next_cursor: None,
            meta: None,
        })
    }

    async fn read_resource(
        &self,
        ReadResourceRequestParam { uri }: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        let team = uri
            .strip_prefix(TODAY_URI_PREFIX)
            .and_then(|name| name.parse::<Team>().ok());
        let Some(team) = team else {
            return Err(McpError::resource_not_found(
                "resource_not_found",
                Some(rmcp::serde_json::json!({ "uri": uri })),
            ));
        };

        let payload = self
            .blocking(move |app| {
                let today = app.today().format(api::DATE_FORMAT).to_string();
                let query = SnapshotQuery::new(team.name(), today);
                api::ApiResponse::from_result(api::get_snapshot(&app.snapshots, &query)).to_json()
            })
            .await?;

        Ok(ReadResourceResult {
            contents: vec![ResourceContents::text(payload, uri)],
        })
    }
}

/// Run the MCP server with stdio transport
pub async fn run_mcp_server(config: Config) -> anyhow::Result<()> {
    use rmcp::transport::stdio;

    let app = tokio::task::spawn_blocking(move || -> anyhow::Result<App> {
        let app = App::open(&config)?;
        app.refresh();
        Ok(app)
    })
    .await??;

    let server = RosterboardMcpServer::new(Arc::new(app));
    let service = server.serve(stdio()).await?;
    service.waiting().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn today_uris_round_trip_to_teams() {
        for team in Team::all() {
            let uri = today_uri(*team);
            let parsed = uri
                .strip_prefix(TODAY_URI_PREFIX)
                .and_then(|name| name.parse::<Team>().ok());
            assert_eq!(parsed, Some(*team));
        }
    }
}
