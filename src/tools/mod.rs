//! Fixed tool registry exposed to the chat model.
//!
//! Every tool takes a JSON arguments object and returns plain text. Memory
//! and market failures are already folded into text by the layers below;
//! the registry only adds errors for unknown tools and bad arguments.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use crate::llm::{ToolCall, ToolSpec};
use crate::market::MarketClient;
use crate::memory::actor::ActorResolver;
use crate::memory::core::ids::{ActorId, SessionId};
use crate::memory::profile::{BrokerIdentity, ProfileAggregator};
use crate::memory::recorder::{RecordOutcome, update_financial_interests};

const MISSING_ACTOR_TEXT: &str = "No actor_id provided. Please use identify_broker() first to get the correct actor_id, then call this function with that actor_id.";
const UPDATE_OK_TEXT: &str = "Financial interests successfully updated in long-term memory profile";
const UPDATE_FAILED_TEXT: &str = "Unable to update financial interests at this time";

/// Errors raised before a tool runs.
#[derive(Debug, Error)]
pub enum ToolError {
    /// No tool with this name.
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    /// Arguments did not match the tool schema.
    #[error("Invalid arguments for {tool}: {source}")]
    InvalidArguments {
        /// Tool name.
        tool: Tool,
        /// Decoding error.
        source: serde_json::Error,
    },
}

/// The tools the model may call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Tool {
    /// Resolve a broker from a message and probe for a stored profile.
    IdentifyBroker,
    /// Read the merged broker profile.
    GetBrokerFinancialProfile,
    /// Write a profile update.
    UpdateBrokerFinancialInterests,
    /// Show the recent conversation.
    ListConversationHistory,
    /// Quote page text for a ticker.
    GetStockData,
    /// News search page text.
    SearchNews,
}

impl Tool {
    /// Every tool, in catalogue order.
    pub const ALL: [Self; 6] = [
        Self::IdentifyBroker,
        Self::GetBrokerFinancialProfile,
        Self::UpdateBrokerFinancialInterests,
        Self::ListConversationHistory,
        Self::GetStockData,
        Self::SearchNews,
    ];

    /// Name the model calls the tool by.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::IdentifyBroker => "identify_broker",
            Self::GetBrokerFinancialProfile => "get_broker_financial_profile",
            Self::UpdateBrokerFinancialInterests => "update_broker_financial_interests",
            Self::ListConversationHistory => "list_conversation_history",
            Self::GetStockData => "get_stock_data",
            Self::SearchNews => "search_news",
        }
    }

    /// Description and argument schema advertised to the model.
    #[must_use]
    pub fn spec(self) -> ToolSpec {
        let (description, parameters) = match self {
            Self::IdentifyBroker => (
                "Identify the broker from their message (broker card or introduction) and return their consistent actor_id and whether a profile already exists.",
                json!({
                    "type": "object",
                    "properties": {
                        "user_message": {"type": "string", "description": "The user's message containing identity information"}
                    },
                    "required": ["user_message"]
                }),
            ),
            Self::GetBrokerFinancialProfile => (
                "Retrieve the long-term financial interests and investment profile of a broker. Use the actor_id returned by identify_broker.",
                json!({
                    "type": "object",
                    "properties": {
                        "actor_id": {"type": "string", "description": "actor_id from identify_broker"}
                    },
                    "required": ["actor_id"]
                }),
            ),
            Self::UpdateBrokerFinancialInterests => (
                "Store new financial interests, preferences or risk tolerance in the broker's long-term profile.",
                json!({
                    "type": "object",
                    "properties": {
                        "interests_update": {"type": "string", "description": "New profile information"},
                        "actor_id": {"type": "string", "description": "actor_id from identify_broker"}
                    },
                    "required": ["interests_update", "actor_id"]
                }),
            ),
            Self::ListConversationHistory => (
                "Retrieve recent conversation history for a broker in this session.",
                json!({
                    "type": "object",
                    "properties": {
                        "actor_id": {"type": "string", "description": "actor_id from identify_broker"}
                    }
                }),
            ),
            Self::GetStockData => (
                "Get current quote page information for a stock ticker symbol.",
                json!({
                    "type": "object",
                    "properties": {
                        "symbol": {"type": "string", "description": "Ticker symbol, e.g. AAPL"}
                    },
                    "required": ["symbol"]
                }),
            ),
            Self::SearchNews => (
                "Search a news source for business news. Sources: bloomberg, reuters, cnbc, wsj, financial times, dow jones.",
                json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string", "description": "Search query"},
                        "news_source": {"type": "string", "description": "News source, defaults to bloomberg"}
                    },
                    "required": ["query"]
                }),
            ),
        };
        ToolSpec {
            name: self.name().to_string(),
            description: description.to_string(),
            parameters,
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Tool {
    type Err = ToolError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tool| tool.name() == name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))
    }
}

#[derive(Deserialize)]
struct IdentifyArgs {
    user_message: String,
}

#[derive(Deserialize)]
struct ActorArgs {
    #[serde(default, alias = "actor_id_override")]
    actor_id: Option<String>,
}

#[derive(Deserialize)]
struct UpdateArgs {
    interests_update: String,
    #[serde(default, alias = "actor_id_override")]
    actor_id: Option<String>,
}

#[derive(Deserialize)]
struct StockArgs {
    symbol: String,
}

fn default_news_source() -> String {
    "bloomberg".to_string()
}

#[derive(Deserialize)]
struct NewsArgs {
    query: String,
    #[serde(default = "default_news_source")]
    news_source: String,
}

fn decode<T: DeserializeOwned>(tool: Tool, arguments: &serde_json::Value) -> Result<T, ToolError> {
    let arguments = if arguments.is_null() {
        json!({})
    } else {
        arguments.clone()
    };
    serde_json::from_value(arguments).map_err(|source| ToolError::InvalidArguments { tool, source })
}

fn explicit_actor(actor_id: Option<String>) -> Option<ActorId> {
    actor_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .map(ActorId::new)
}

/// Tool dispatcher bound to one session.
pub struct ToolRegistry {
    resolver: Arc<ActorResolver>,
    profiles: ProfileAggregator,
    market: Arc<MarketClient>,
    session: SessionId,
}

impl ToolRegistry {
    /// Bind the tools to their collaborators.
    #[must_use]
    pub const fn new(
        resolver: Arc<ActorResolver>,
        profiles: ProfileAggregator,
        market: Arc<MarketClient>,
        session: SessionId,
    ) -> Self {
        Self {
            resolver,
            profiles,
            market,
            session,
        }
    }

    /// Specs for every tool.
    #[must_use]
    pub fn specs(&self) -> Vec<ToolSpec> {
        Tool::ALL.into_iter().map(Tool::spec).collect()
    }

    /// Session the tools read and write.
    #[must_use]
    pub const fn session(&self) -> &SessionId {
        &self.session
    }

    /// Run a call and always return text.
    pub async fn execute(&self, call: &ToolCall) -> String {
        match self.dispatch(call).await {
            Ok(text) => text,
            Err(err) => {
                warn!(tool = %call.name, %err, "Tool call rejected");
                err.to_string()
            }
        }
    }

    /// Run a call.
    ///
    /// # Errors
    /// Returns an error for unknown tools or arguments that do not match the
    /// tool schema.
    pub async fn dispatch(&self, call: &ToolCall) -> Result<String, ToolError> {
        let tool: Tool = call.name.parse()?;
        debug!(%tool, "Running tool");

        let text = match tool {
            Tool::IdentifyBroker => {
                let args: IdentifyArgs = decode(tool, &call.arguments)?;
                let actor = self.resolver.resolve(&args.user_message);
                let probe = self.profiles.probe(&actor).await;
                BrokerIdentity { actor, probe }.to_string()
            }
            Tool::GetBrokerFinancialProfile => {
                let args: ActorArgs = decode(tool, &call.arguments)?;
                match explicit_actor(args.actor_id) {
                    Some(actor) => self.profiles.profile_for(&actor, &self.session).await.to_string(),
                    None => MISSING_ACTOR_TEXT.to_string(),
                }
            }
            Tool::UpdateBrokerFinancialInterests => {
                let args: UpdateArgs = decode(tool, &call.arguments)?;
                match explicit_actor(args.actor_id) {
                    Some(actor) => self.update_interests(&actor, &args.interests_update).await,
                    None => MISSING_ACTOR_TEXT.to_string(),
                }
            }
            Tool::ListConversationHistory => {
                let args: ActorArgs = decode(tool, &call.arguments)?;
                let actor = explicit_actor(args.actor_id).unwrap_or_else(ActorId::unknown);
                self.profiles
                    .conversation_history(&actor, &self.session)
                    .await
                    .to_string()
            }
            Tool::GetStockData => {
                let args: StockArgs = decode(tool, &call.arguments)?;
                self.market.get_stock_data(&args.symbol).await
            }
            Tool::SearchNews => {
                let args: NewsArgs = decode(tool, &call.arguments)?;
                self.market.search_news(&args.query, &args.news_source).await
            }
        };
        Ok(text)
    }

    async fn update_interests(&self, actor: &ActorId, update: &str) -> String {
        let outcome =
            update_financial_interests(self.profiles.handle(), actor, &self.session, update).await;
        match outcome {
            RecordOutcome::Recorded => UPDATE_OK_TEXT.to_string(),
            RecordOutcome::Failed { .. } => UPDATE_FAILED_TEXT.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::MarketConfig;
    use crate::memory::core::config::ProfileConfig;
    use crate::memory::core::ids::StoreId;
    use crate::memory::core::strategy::default_strategies;
    use crate::memory::provisioning::StoreHandle;
    use crate::memory::service::{InMemoryFaults, InMemoryMemoryService, StoreStatus};

    async fn registry() -> (Arc<InMemoryMemoryService>, ToolRegistry) {
        let service = InMemoryMemoryService::new().unwrap().shared();
        let id = StoreId::new("Market-tools00001");
        service
            .insert_store(id.clone(), "Market", StoreStatus::Active, default_strategies())
            .await;
        let profiles =
            ProfileAggregator::new(StoreHandle::new(service.clone(), id), ProfileConfig::default());
        let registry = ToolRegistry::new(
            Arc::new(ActorResolver::new().unwrap()),
            profiles,
            Arc::new(MarketClient::new(MarketConfig::default()).unwrap()),
            SessionId::new("market-20250101000000"),
        );
        (service, registry)
    }

    fn call(name: &str, arguments: serde_json::Value) -> ToolCall {
        ToolCall {
            name: name.to_string(),
            arguments,
        }
    }

    #[test]
    fn catalogue_is_fixed() {
        let names: Vec<&str> = Tool::ALL.iter().map(|tool| tool.name()).collect();
        assert_eq!(
            names,
            vec![
                "identify_broker",
                "get_broker_financial_profile",
                "update_broker_financial_interests",
                "list_conversation_history",
                "get_stock_data",
                "search_news",
            ]
        );
        for tool in Tool::ALL {
            assert_eq!(tool.name().parse::<Tool>().unwrap(), tool);
            assert_eq!(tool.spec().parameters["type"], json!("object"));
        }
    }

    #[tokio::test]
    async fn broker_flow_from_new_to_existing() {
        let (_, registry) = registry().await;
        let intro = json!({"user_message": "Hi, I'm Tim Dunk from Goldman Sachs"});

        let first = registry.execute(&call("identify_broker", intro.clone())).await;
        assert!(first.starts_with("ACTOR_ID: broker_tim_dunk\nSTATUS: New broker"));

        let updated = registry
            .execute(&call(
                "update_broker_financial_interests",
                json!({
                    "interests_update": "Focus on semiconductors, aggressive risk tolerance",
                    "actor_id": "broker_tim_dunk"
                }),
            ))
            .await;
        assert_eq!(updated, UPDATE_OK_TEXT);

        let second = registry.execute(&call("identify_broker", intro)).await;
        assert!(second.contains("STATUS: Existing broker found"));

        let profile = registry
            .execute(&call(
                "get_broker_financial_profile",
                json!({"actor_id": "broker_tim_dunk"}),
            ))
            .await;
        assert!(profile.starts_with("Broker Financial Profile:\n[USER_PREFERENCE] "));
        assert!(profile.contains("semiconductors"));
    }

    #[tokio::test]
    async fn memory_tools_require_actor() {
        let (_, registry) = registry().await;
        let profile = registry
            .execute(&call("get_broker_financial_profile", json!({})))
            .await;
        assert_eq!(profile, MISSING_ACTOR_TEXT);

        let update = registry
            .execute(&call(
                "update_broker_financial_interests",
                json!({"interests_update": "likes bonds", "actor_id": "  "}),
            ))
            .await;
        assert_eq!(update, MISSING_ACTOR_TEXT);
    }

    #[tokio::test]
    async fn update_failure_is_soft() {
        let (service, registry) = registry().await;
        service
            .set_faults(InMemoryFaults {
                create_event: true,
                ..InMemoryFaults::default()
            })
            .await;
        let text = registry
            .execute(&call(
                "update_broker_financial_interests",
                json!({"interests_update": "likes bonds", "actor_id": "broker_a"}),
            ))
            .await;
        assert_eq!(text, UPDATE_FAILED_TEXT);
    }

    #[tokio::test]
    async fn history_defaults_to_unknown_user() {
        let (_, registry) = registry().await;
        let text = registry
            .execute(&call("list_conversation_history", serde_json::Value::Null))
            .await;
        assert_eq!(text, "No conversation history available");
    }

    #[tokio::test]
    async fn rejects_unknown_tools_and_bad_arguments() {
        let (_, registry) = registry().await;
        let err = registry
            .dispatch(&call("place_order", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(name) if name == "place_order"));

        let text = registry
            .execute(&call("get_stock_data", json!({"ticker": "AAPL"})))
            .await;
        assert!(text.starts_with("Invalid arguments for get_stock_data:"));
    }

    #[tokio::test]
    async fn market_failures_are_text() {
        let (_, registry) = registry().await;
        let text = registry
            .execute(&call("get_stock_data", json!({"symbol": "$$$"})))
            .await;
        assert!(text.starts_with("Error getting stock data for $$$:"));
    }
}
