//! Session orchestrator for Lorekeeper.
//!
//! `SessionOrchestrator` runs one chat message through the agent loop:
//! ownership check, context load, bounded planning/tool rounds on the cheap
//! deterministic model, a single streamed synthesis call, persistence of the
//! user/assistant turn pair, and the final `complete` frame.
//!
//! Worst-case model cost per message is `max_iterations` planning calls plus
//! one synthesis call.

use futures_util::StreamExt;
use tracing::{Instrument, debug, info, info_span, warn};

use lorekeeper_types::chat::{Turn, TurnRole, session_belongs_to};
use lorekeeper_types::config::ServiceConfig;
use lorekeeper_types::error::{DeliveryError, RepositoryError};
use lorekeeper_types::llm::{CompletionRequest, CompletionResponse, LlmError, Message, StreamEvent};
use lorekeeper_types::message::{ChatRequest, OutboundFrame};
use lorekeeper_types::tool::{InjectedContext, ToolInvocation};

use crate::agent::prompt::{
    planning_system_prompt, synthesis_system_prompt, tools_footer, user_message_with_results,
};
use crate::agent::state::{AgentState, FailureReason, Phase};
use crate::chat::cache::ContextCache;
use crate::chat::history::ChatHistoryStore;
use crate::delivery::StreamingDelivery;
use crate::llm::box_provider::BoxLlmProvider;
use crate::tools::files::CampaignFileStore;
use crate::tools::registry::{ToolRegistry, estimate_tokens};
use crate::tools::search::CampaignSearch;

/// Number of stored turns replayed into both model calls.
const RECENT_TURNS: usize = 2;

/// Model ids, bounds and sampling settings for the loop.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub planning_model: String,
    pub synthesis_model: String,
    pub max_iterations: u32,
    pub planning_max_tokens: u32,
    pub synthesis_max_tokens: u32,
    pub synthesis_temperature: f64,
    pub history_ttl_secs: i64,
    /// Token budget for the stored turns replayed into both model calls.
    pub max_history_tokens: usize,
}

impl OrchestratorSettings {
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            planning_model: config.models.planning_model.clone(),
            synthesis_model: config.models.synthesis_model.clone(),
            max_iterations: config.agent.max_iterations,
            planning_max_tokens: config.agent.planning_max_tokens,
            synthesis_max_tokens: config.agent.synthesis_max_tokens,
            synthesis_temperature: config.agent.synthesis_temperature,
            history_ttl_secs: config.storage.history_ttl_secs,
            max_history_tokens: config.agent.max_history_tokens as usize,
        }
    }
}

/// What a successfully handled message produced.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Persisted assistant answer (without the tools footer).
    pub answer: String,
    pub tool_invocations: Vec<ToolInvocation>,
    pub iterations: u32,
    /// The originating connection disappeared while streaming.
    pub client_gone: bool,
}

/// Errors that end a message in `Failed`.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("session '{session_id}' does not belong to the caller")]
    SessionUnauthorized { session_id: String },

    #[error("model unavailable: {0}")]
    ModelUnavailable(#[from] LlmError),

    #[error("failed to persist turn: {0}")]
    Persistence(#[source] RepositoryError),
}

impl OrchestratorError {
    pub fn reason(&self) -> FailureReason {
        match self {
            OrchestratorError::SessionUnauthorized { .. } => FailureReason::SessionUnauthorized,
            OrchestratorError::ModelUnavailable(_) => FailureReason::ModelUnavailable,
            OrchestratorError::Persistence(_) => FailureReason::PersistenceError,
        }
    }

    /// Text for the client's `error` frame; internal details stay in logs.
    pub fn client_message(&self) -> &'static str {
        match self {
            OrchestratorError::SessionUnauthorized { .. } => "Invalid session",
            OrchestratorError::ModelUnavailable(_) => {
                "The assistant is unavailable right now. Please try again."
            }
            OrchestratorError::Persistence(_) => {
                "Your message was answered but could not be saved to the session history."
            }
        }
    }
}

/// Pushes frames to one connection, going quiet once it is gone.
struct Outbox<'a, D: StreamingDelivery> {
    delivery: &'a D,
    connection_id: &'a str,
    gone: bool,
}

impl<'a, D: StreamingDelivery> Outbox<'a, D> {
    fn new(delivery: &'a D, connection_id: &'a str) -> Self {
        Self {
            delivery,
            connection_id,
            gone: false,
        }
    }

    async fn push(&mut self, frame: OutboundFrame) {
        if self.gone {
            return;
        }
        let kind = frame.kind();
        match self.delivery.send(self.connection_id, frame).await {
            Ok(()) => {}
            Err(DeliveryError::Gone) => {
                info!(connection_id = self.connection_id, "connection gone, suppressing further frames");
                self.gone = true;
            }
            Err(err) => {
                warn!(connection_id = self.connection_id, frame = kind, error = %err, "frame delivery failed");
            }
        }
    }
}

pub struct SessionOrchestrator<H, S, F>
where
    H: ChatHistoryStore,
    S: CampaignSearch,
    F: CampaignFileStore,
{
    provider: BoxLlmProvider,
    history: H,
    tools: ToolRegistry<S, F>,
    settings: OrchestratorSettings,
}

impl<H, S, F> SessionOrchestrator<H, S, F>
where
    H: ChatHistoryStore,
    S: CampaignSearch,
    F: CampaignFileStore,
{
    pub fn new(
        provider: BoxLlmProvider,
        history: H,
        tools: ToolRegistry<S, F>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            provider,
            history,
            tools,
            settings,
        }
    }

    /// Handle one chat message from `connection_id`, authenticated as `user_id`.
    ///
    /// Failures are reported to the client as an `error` frame before being
    /// returned; already streamed chunks are never retracted.
    pub async fn handle_message<D: StreamingDelivery>(
        &self,
        user_id: &str,
        connection_id: &str,
        request: &ChatRequest,
        delivery: &D,
    ) -> Result<TurnOutcome, OrchestratorError> {
        let mut state = AgentState::new();
        let mut outbox = Outbox::new(delivery, connection_id);

        if !session_belongs_to(&request.session_id, user_id) {
            warn!(
                user_id,
                session_id = %request.session_id,
                "message rejected: session does not belong to caller"
            );
            let err = OrchestratorError::SessionUnauthorized {
                session_id: request.session_id.clone(),
            };
            return Err(Self::fail(&mut state, &mut outbox, err).await);
        }

        let context = InjectedContext {
            user_id: user_id.to_string(),
            campaign: request.campaign.clone(),
            session_id: request.session_id.clone(),
        };
        let cache = ContextCache::new(&self.history, self.tools.search(), &context);
        let recent = history_messages(
            cache.recent_turns(RECENT_TURNS).await,
            self.settings.max_history_tokens,
        );
        let background = cache.background().await.to_string();

        state.advance(Phase::Planning);
        while state.iteration_count < self.settings.max_iterations {
            let planning = self.planning_request(&recent, &background, &request.message, &state);
            let response = match self.plan(&planning, state.iteration_count).await {
                Ok(response) => response,
                Err(err) => return Err(Self::fail(&mut state, &mut outbox, err.into()).await),
            };

            if response.tool_calls.is_empty() {
                debug!(iteration = state.iteration_count, "planning finished without tool calls");
                break;
            }

            state.pending_plan = response.tool_calls;
            state.advance(Phase::ToolExecuting);
            for call in std::mem::take(&mut state.pending_plan) {
                let invocation = self.tools.invoke(&call, &context, &cache).await;
                state.tool_results.push(invocation);
            }
            state.iteration_count += 1;

            if state.iteration_count < self.settings.max_iterations {
                state.advance(Phase::Planning);
            } else {
                info!(
                    max_iterations = self.settings.max_iterations,
                    "iteration bound reached, forcing synthesis"
                );
            }
        }
        let bound_reached = state.iteration_count >= self.settings.max_iterations;

        state.advance(Phase::Synthesizing);
        let synthesis = self.synthesis_request(&recent, &background, &request.message, &state, bound_reached);
        let span = info_span!(
            "gen_ai.synthesize",
            gen_ai.system = self.provider.name(),
            gen_ai.request.model = %synthesis.model,
            gen_ai.request.max_tokens = synthesis.max_tokens,
            gen_ai.request.temperature = ?synthesis.temperature,
            gen_ai.request.stream = true,
        );
        match self.synthesize(synthesis, &mut outbox).instrument(span).await {
            Ok(answer) => state.final_answer = answer,
            Err(err) => return Err(Self::fail(&mut state, &mut outbox, err.into()).await),
        }

        if let Some(footer) = tools_footer(&state.tool_results) {
            outbox.push(OutboundFrame::chunk(footer)).await;
        }

        state.advance(Phase::Persisting);
        let turns = [
            Turn::user(&context.session_id, request.message.clone()),
            Turn::assistant(&context.session_id, state.final_answer.clone()),
        ];
        if let Err(err) = self
            .history
            .append(&context.session_id, user_id, &turns, self.settings.history_ttl_secs)
            .await
        {
            warn!(session_id = %context.session_id, error = %err, "turn persistence failed");
            return Err(Self::fail(&mut state, &mut outbox, OrchestratorError::Persistence(err)).await);
        }

        state.advance(Phase::Streaming);
        outbox.push(OutboundFrame::Complete(String::new())).await;
        state.advance(Phase::Done);

        info!(
            session_id = %context.session_id,
            iterations = state.iteration_count,
            tool_calls = state.tool_results.len(),
            answer_len = state.final_answer.len(),
            "message handled"
        );

        Ok(TurnOutcome {
            answer: state.final_answer,
            tool_invocations: state.tool_results,
            iterations: state.iteration_count,
            client_gone: outbox.gone,
        })
    }

    async fn fail<D: StreamingDelivery>(
        state: &mut AgentState,
        outbox: &mut Outbox<'_, D>,
        err: OrchestratorError,
    ) -> OrchestratorError {
        state.fail(err.reason());
        outbox
            .push(OutboundFrame::Error(err.client_message().to_string()))
            .await;
        err
    }

    async fn plan(
        &self,
        request: &CompletionRequest,
        iteration: u32,
    ) -> Result<CompletionResponse, LlmError> {
        let span = info_span!(
            "gen_ai.plan",
            gen_ai.system = self.provider.name(),
            gen_ai.request.model = %request.model,
            gen_ai.request.max_tokens = request.max_tokens,
            gen_ai.request.temperature = ?request.temperature,
            gen_ai.request.stream = false,
            iteration,
        );
        let response = self.provider.complete(request).instrument(span).await?;
        debug!(
            iteration,
            stop_reason = %response.stop_reason,
            tool_calls = response.tool_calls.len(),
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "planning response"
        );
        Ok(response)
    }

    /// Stream the synthesis call, forwarding every text delta as it arrives.
    async fn synthesize<D: StreamingDelivery>(
        &self,
        request: CompletionRequest,
        outbox: &mut Outbox<'_, D>,
    ) -> Result<String, LlmError> {
        let mut stream = self.provider.stream(request);
        let mut answer = String::new();

        while let Some(event) = stream.next().await {
            match event? {
                StreamEvent::TextDelta { text, .. } => {
                    if text.is_empty() {
                        continue;
                    }
                    answer.push_str(&text);
                    outbox.push(OutboundFrame::chunk(text)).await;
                }
                StreamEvent::Usage(usage) => {
                    debug!(
                        input_tokens = usage.input_tokens,
                        output_tokens = usage.output_tokens,
                        "synthesis usage"
                    );
                }
                StreamEvent::Done => break,
                _ => {}
            }
        }

        Ok(answer)
    }

    fn planning_request(
        &self,
        recent: &[Message],
        background: &str,
        message: &str,
        state: &AgentState,
    ) -> CompletionRequest {
        let mut messages = recent.to_vec();
        messages.push(Message::user(user_message_with_results(
            message,
            &state.tool_results,
            false,
        )));

        CompletionRequest {
            model: self.settings.planning_model.clone(),
            messages,
            system: Some(planning_system_prompt(background)),
            max_tokens: self.settings.planning_max_tokens,
            temperature: Some(0.0),
            top_p: Some(1.0),
            top_k: Some(1),
            stream: false,
            tools: self.tools.definitions().to_vec(),
            stop_sequences: None,
        }
    }

    fn synthesis_request(
        &self,
        recent: &[Message],
        background: &str,
        message: &str,
        state: &AgentState,
        bound_reached: bool,
    ) -> CompletionRequest {
        let mut messages = recent.to_vec();
        messages.push(Message::user(user_message_with_results(
            message,
            &state.tool_results,
            bound_reached,
        )));

        CompletionRequest {
            model: self.settings.synthesis_model.clone(),
            messages,
            system: Some(synthesis_system_prompt(background)),
            max_tokens: self.settings.synthesis_max_tokens,
            temperature: Some(self.settings.synthesis_temperature),
            top_p: None,
            top_k: None,
            stream: true,
            tools: Vec::new(),
            stop_sequences: None,
        }
    }
}

/// Stored turns as model messages, starting with a user turn.
/// Newest turns that fit the token budget, starting at a user turn.
fn history_messages(turns: &[Turn], token_budget: usize) -> Vec<Message> {
    let mut used = 0;
    let kept = turns
        .iter()
        .rev()
        .take_while(|turn| {
            used += estimate_tokens(&turn.content);
            used <= token_budget
        })
        .count();

    turns[turns.len() - kept..]
        .iter()
        .skip_while(|turn| turn.role == TurnRole::Assistant)
        .map(|turn| match turn.role {
            TurnRole::User => Message::user(turn.content.clone()),
            TurnRole::Assistant => Message::assistant(turn.content.clone()),
        })
        .collect()
}
