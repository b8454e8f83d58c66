//! Conversational turn loop.
//!
//! One turn: system prompt plus transcript go to the model, requested tools
//! run through the registry, and the loop repeats until the model answers
//! in plain text. The finished turn is then written to memory under the
//! actor resolved from the user's message, but only when both sides of the
//! turn have text.

pub mod error;

pub use error::{AgentError, AgentResult};

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::AgentConfig;
use crate::llm::{ChatMessage, ChatModel, OllamaChatModel, ToolSpec};
use crate::market::MarketClient;
use crate::memory::actor::ActorResolver;
use crate::memory::core::ids::{ActorId, SessionId};
use crate::memory::profile::ProfileAggregator;
use crate::memory::provisioning::{StoreHandle, ensure_store};
use crate::memory::recorder::{RecordOutcome, record_turn, should_record};
use crate::memory::service::{MemoryService, SqliteMemoryService};
use crate::tools::ToolRegistry;

/// System instructions sent ahead of every transcript.
pub const SYSTEM_PROMPT: &str = "You're an expert market intelligence analyst with deep expertise in financial markets, business strategy, and economic trends. You keep long-term financial profiles for each broker you work with.

TOOLS:
- get_stock_data(symbol): current quote page for a ticker.
- search_news(query, news_source): business news from bloomberg, reuters, cnbc, wsj, financial times or dow jones.
- identify_broker(user_message): resolve the broker's actor_id and whether a profile exists.
- get_broker_financial_profile(actor_id): stored interests, preferences and risk tolerance.
- update_broker_financial_interests(interests_update, actor_id): store new interests or profile changes.
- list_conversation_history(actor_id): recent conversation in this session.

WORKFLOW:
1. When a user introduces themselves, call identify_broker first and keep the actor_id it returns.
2. For returning brokers, call get_broker_financial_profile and tailor the analysis to it.
3. When a broker shares preferences, risk tolerance or goals, call update_broker_financial_interests.
4. Use get_stock_data and search_news for market facts; connect them to the broker's stored interests.

Deliver concise, institutional-quality analysis aligned with the broker's stored risk tolerance and investment style.";

/// What happened during one turn.
#[derive(Clone, Debug)]
pub struct TurnReport {
    /// Final assistant text.
    pub reply: String,
    /// Actor the turn was attributed to.
    pub actor: ActorId,
    /// Tool calls executed.
    pub tool_calls: usize,
    /// Memory write result; `None` when the turn did not qualify.
    pub recording: Option<RecordOutcome>,
}

/// Market trends agent bound to one session.
pub struct MarketTrendsAgent {
    model: Arc<dyn ChatModel>,
    tools: ToolRegistry,
    specs: Vec<ToolSpec>,
    resolver: Arc<ActorResolver>,
    handle: StoreHandle,
    max_tool_rounds: usize,
    transcript: Vec<ChatMessage>,
}

impl MarketTrendsAgent {
    /// Assemble an agent from ready collaborators.
    #[must_use]
    pub fn new(
        model: Arc<dyn ChatModel>,
        tools: ToolRegistry,
        resolver: Arc<ActorResolver>,
        handle: StoreHandle,
        max_tool_rounds: usize,
    ) -> Self {
        let specs = tools.specs();
        Self {
            model,
            tools,
            specs,
            resolver,
            handle,
            max_tool_rounds,
            transcript: Vec::new(),
        }
    }

    /// Build the production agent: `SQLite` memory, shared store, Ollama.
    ///
    /// # Errors
    /// Returns an error if configuration is invalid, the store cannot be
    /// provisioned, or a client cannot be built.
    pub async fn from_config(config: &AgentConfig) -> AgentResult<Self> {
        config.validate()?;

        let service: Arc<dyn MemoryService> =
            Arc::new(SqliteMemoryService::new(&config.memory.storage).await?);
        let handle = ensure_store(service, &config.memory.store).await?;
        let model: Arc<dyn ChatModel> = Arc::new(OllamaChatModel::new(&config.llm)?);
        let market = Arc::new(MarketClient::new(config.market.clone())?);

        Self::assemble(model, handle, market, config, SessionId::generate())
    }

    /// Wire the tool registry around an existing store and model.
    ///
    /// # Errors
    /// Returns an error if the actor resolver patterns fail to compile.
    pub fn assemble(
        model: Arc<dyn ChatModel>,
        handle: StoreHandle,
        market: Arc<MarketClient>,
        config: &AgentConfig,
        session: SessionId,
    ) -> AgentResult<Self> {
        let resolver = Arc::new(ActorResolver::new()?);
        let profiles = ProfileAggregator::new(handle.clone(), config.memory.profile.clone());
        info!(store_id = %handle.store_id(), session = %session, "Agent ready");
        let tools = ToolRegistry::new(resolver.clone(), profiles, market, session);
        Ok(Self::new(
            model,
            tools,
            resolver,
            handle,
            config.llm.max_tool_rounds,
        ))
    }

    /// Session this agent records under.
    #[must_use]
    pub const fn session(&self) -> &SessionId {
        self.tools.session()
    }

    /// Store this agent records into.
    #[must_use]
    pub const fn store(&self) -> &StoreHandle {
        &self.handle
    }

    /// Transcript so far, without the system prompt.
    #[must_use]
    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    /// Run one conversational turn.
    ///
    /// # Errors
    /// Returns an error if the model fails or keeps calling tools past the
    /// round limit. Memory failures never surface here.
    pub async fn respond(&mut self, user_text: &str) -> AgentResult<TurnReport> {
        self.transcript.push(ChatMessage::user(user_text));
        let actor = self.resolver.resolve(user_text);
        debug!(actor = %actor, "Turn started");

        let mut tool_calls = 0;
        let mut reply = None;
        for _ in 0..self.max_tool_rounds {
            let mut messages = Vec::with_capacity(self.transcript.len() + 1);
            messages.push(ChatMessage::system(SYSTEM_PROMPT));
            messages.extend(self.transcript.iter().cloned());

            let answer = self.model.chat(&messages, &self.specs).await?;
            if answer.tool_calls.is_empty() {
                reply = Some(answer.content);
                break;
            }

            self.transcript
                .push(ChatMessage::assistant(answer.content, answer.tool_calls.clone()));
            for call in &answer.tool_calls {
                let output = self.tools.execute(call).await;
                self.transcript.push(ChatMessage::tool(call.name.clone(), output));
                tool_calls += 1;
            }
        }

        let Some(reply) = reply else {
            return Err(AgentError::ToolRoundsExceeded(self.max_tool_rounds));
        };
        self.transcript
            .push(ChatMessage::assistant(reply.clone(), Vec::new()));

        let recording = if should_record(user_text, &reply) {
            Some(record_turn(&self.handle, &actor, self.session(), user_text, &reply).await)
        } else {
            debug!(actor = %actor, "Skipping memory write for empty turn");
            None
        };

        Ok(TurnReport {
            reply,
            actor,
            tool_calls,
            recording,
        })
    }
}
