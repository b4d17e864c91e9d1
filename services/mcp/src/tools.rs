//! Advisory board tools exposed over the Model Context Protocol.
//!
//! Each tool is a thin wrapper over the advisory HTTP API that formats the
//! result as Markdown for the calling assistant.

use advisory_client::ApiClient;
use advisory_core::{
    AdvisorSummary,
    api::{ChatRequest, ContextTurn, PanelRequest},
};
use rmcp::{
    ServerHandler,
    handler::server::{router::tool::ToolRouter, tool::Parameters},
    model::{ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{info, warn};

/// One earlier exchange with the advisor.
#[derive(Deserialize, JsonSchema, Debug, Default)]
pub struct ContextArg {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub advisor: String,
}

#[derive(Deserialize, JsonSchema, Debug)]
pub struct ChatArgs {
    #[schemars(description = "Id of the advisor to talk to, e.g. 'alex'")]
    pub advisor_id: String,
    #[schemars(description = "Your message to the advisor")]
    pub message: String,
    #[schemars(description = "Previous conversation context (optional)")]
    #[serde(default)]
    pub context: Vec<ContextArg>,
}

#[derive(Deserialize, JsonSchema, Debug)]
pub struct PanelArgs {
    #[schemars(description = "The topic for discussion")]
    pub topic: String,
    #[schemars(description = "Advisor ids to include (optional, defaults to all)")]
    #[serde(default)]
    pub advisors: Option<Vec<String>>,
}

pub struct AdvisoryTools {
    api: ApiClient,
    tool_router: ToolRouter<Self>,
}

#[tool_handler]
impl ServerHandler for AdvisoryTools {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(
                "Consult a board of business advisors one at a time or as a panel.".to_string(),
            ),
            ..Default::default()
        }
    }
}

fn available(roster: &[AdvisorSummary]) -> String {
    roster
        .iter()
        .map(|a| a.id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[tool_router]
impl AdvisoryTools {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            tool_router: Self::tool_router(),
        }
    }

    async fn roster(&self) -> Result<Vec<AdvisorSummary>, String> {
        self.api
            .list_advisors()
            .await
            .map_err(|e| format!("Could not load advisors: {e}"))
    }

    #[tool(description = "Have a conversation with one advisor from the board.")]
    pub async fn chat_with_advisor(&self, args: Parameters<ChatArgs>) -> Result<String, String> {
        let ChatArgs {
            advisor_id,
            message,
            context,
        } = args.0;
        info!(%advisor_id, "Executing tool 'chat_with_advisor'");

        let roster = self.roster().await?;
        let Some(advisor) = roster.iter().find(|a| a.id == advisor_id) else {
            return Ok(format!(
                "Advisor '{advisor_id}' not found. Available advisors: {}",
                available(&roster)
            ));
        };

        let request = ChatRequest {
            message,
            advisor: advisor_id.clone(),
            context: context
                .into_iter()
                .map(|c| ContextTurn {
                    user: c.user,
                    advisor: c.advisor,
                })
                .collect(),
            document: None,
        };
        match self.api.chat(&request).await {
            Ok(reply) => Ok(format!("**{}:** {}", advisor.name, reply.response)),
            Err(e) => {
                warn!(%advisor_id, error = %e, "Chat tool failed");
                Err(format!("Error getting response from {}: {e}", advisor.name))
            }
        }
    }

    #[tool(description = "Start a panel discussion with multiple advisors on a topic.")]
    pub async fn panel_discussion(&self, args: Parameters<PanelArgs>) -> Result<String, String> {
        let PanelArgs { topic, advisors } = args.0;
        info!(%topic, "Executing tool 'panel_discussion'");

        let roster = self.roster().await?;
        let selected = advisors.unwrap_or_default();
        let invalid: Vec<_> = selected
            .iter()
            .filter(|id| !roster.iter().any(|a| &a.id == *id))
            .map(String::as_str)
            .collect();
        if !invalid.is_empty() {
            return Ok(format!(
                "Invalid advisors: {}. Available: {}",
                invalid.join(", "),
                available(&roster)
            ));
        }

        let request = PanelRequest {
            topic: topic.clone(),
            advisors: selected,
            document: None,
        };
        let panel = self
            .api
            .panel(&request)
            .await
            .map_err(|e| format!("Panel discussion failed: {e}"))?;
        let sections: Vec<_> = panel
            .responses
            .iter()
            .map(|r| format!("**{}:** {}", r.name, r.response))
            .collect();
        Ok(format!(
            "# Panel Discussion: {topic}\n\n{}",
            sections.join("\n\n---\n\n")
        ))
    }

    #[tool(description = "Get information about all available advisors.")]
    pub async fn list_advisors(&self) -> Result<String, String> {
        info!("Executing tool 'list_advisors'");
        let roster = self.roster().await?;
        let lines: Vec<_> = roster
            .iter()
            .map(|a| format!("**{}** - {}: {}", a.id, a.name, a.description))
            .collect();
        Ok(format!("# Available Advisors\n\n{}", lines.join("\n\n")))
    }
}
