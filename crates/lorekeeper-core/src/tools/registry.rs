//! The closed tool catalog and its dispatch table.
//!
//! The registry advertises one JSON schema per [`ToolKind`] to the planning
//! model and executes the calls it makes. Arguments are deserialized into
//! typed structs that do not contain the injected context fields, so a model
//! that supplies `user_id`, `campaign` or `session_id` itself is ignored;
//! the values always come from the authenticated session.

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info_span, warn, Instrument};

use lorekeeper_types::chat::TurnRole;
use lorekeeper_types::error::ToolError;
use lorekeeper_types::llm::{ToolCall, ToolDefinition};
use lorekeeper_types::tool::{InjectedContext, ToolInvocation, ToolKind, ToolOutcome};

use crate::chat::cache::ContextCache;
use crate::chat::history::ChatHistoryStore;
use crate::tools::dice::DiceRoller;
use crate::tools::files::{CampaignFileStore, normalize_campaign_path};
use crate::tools::search::{CampaignSearch, format_hits, search_with_fallback};

const DEFAULT_SEARCH_TOP_K: usize = 5;
const MAX_SEARCH_TOP_K: usize = 20;
const DEFAULT_HISTORY_MESSAGES: usize = 10;
const MAX_HISTORY_MESSAGES: usize = 50;

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default = "default_top_k")]
    top_k: usize,
    #[serde(default)]
    category: Option<String>,
}

fn default_top_k() -> usize {
    DEFAULT_SEARCH_TOP_K
}

#[derive(Debug, Deserialize)]
struct FileArgs {
    file_path: String,
}

#[derive(Debug, Deserialize)]
struct DiceArgs {
    notation: String,
}

#[derive(Debug, Deserialize)]
struct HistoryArgs {
    #[serde(default = "default_message_count")]
    message_count: usize,
}

fn default_message_count() -> usize {
    DEFAULT_HISTORY_MESSAGES
}

/// Errors detected while building the dispatch table.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("tool '{0}' registered twice")]
    Duplicate(String),

    #[error("tool '{tool}' declares injected field '{field}' in its schema")]
    InjectedFieldExposed { tool: String, field: String },
}

/// Dispatch table for the four campaign tools.
pub struct ToolRegistry<S: CampaignSearch, F: CampaignFileStore> {
    search: S,
    files: F,
    dice: DiceRoller,
    table: HashMap<&'static str, ToolKind>,
    definitions: Vec<ToolDefinition>,
    history_token_budget: usize,
}

impl<S: CampaignSearch, F: CampaignFileStore> ToolRegistry<S, F> {
    /// Build and validate the table. Fails if a schema exposes a field the
    /// orchestrator is supposed to inject.
    pub fn new(search: S, files: F, dice: DiceRoller) -> Result<Self, RegistryError> {
        let mut table = HashMap::new();
        let mut definitions = Vec::new();

        for kind in ToolKind::ALL {
            if table.insert(kind.name(), kind).is_some() {
                return Err(RegistryError::Duplicate(kind.name().to_string()));
            }
            let definition = definition_for(kind);
            for field in kind.injected_fields() {
                if definition.input_schema["properties"].get(field.key()).is_some() {
                    return Err(RegistryError::InjectedFieldExposed {
                        tool: kind.name().to_string(),
                        field: field.key().to_string(),
                    });
                }
            }
            definitions.push(definition);
        }

        Ok(Self {
            search,
            files,
            dice,
            table,
            definitions,
            history_token_budget: 4000,
        })
    }

    /// Cap on the estimated tokens `get_conversation_history` returns.
    pub fn with_history_token_budget(mut self, tokens: usize) -> Self {
        self.history_token_budget = tokens;
        self
    }

    /// Schemas advertised to the planning model.
    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    pub fn search(&self) -> &S {
        &self.search
    }

    /// Execute one model-requested call. Never fails: errors are captured in
    /// the returned invocation's outcome.
    pub async fn invoke<H: ChatHistoryStore, CS: CampaignSearch>(
        &self,
        call: &ToolCall,
        context: &InjectedContext,
        cache: &ContextCache<'_, H, CS>,
    ) -> ToolInvocation {
        let Some(&kind) = self.table.get(call.name.as_str()) else {
            warn!(tool = %call.name, "model requested unknown tool");
            return ToolInvocation {
                name: call.name.clone(),
                arguments: call.input.clone(),
                injected: BTreeMap::new(),
                outcome: ToolOutcome::Error(ToolError::UnknownTool(call.name.clone()).to_string()),
            };
        };

        let injected: BTreeMap<String, String> = kind
            .injected_fields()
            .iter()
            .map(|field| (field.key().to_string(), context.value_of(*field).to_string()))
            .collect();

        let span = info_span!("tool.invoke", tool = kind.name(), call_id = %call.id);
        let result = self
            .execute(kind, &call.input, context, cache)
            .instrument(span)
            .await;

        let outcome = match result {
            Ok(text) => {
                debug!(tool = kind.name(), bytes = text.len(), "tool succeeded");
                ToolOutcome::Success(text)
            }
            Err(err) => {
                warn!(tool = kind.name(), error = %err, "tool failed");
                ToolOutcome::Error(err.to_string())
            }
        };

        ToolInvocation {
            name: call.name.clone(),
            arguments: call.input.clone(),
            injected,
            outcome,
        }
    }

    async fn execute<H: ChatHistoryStore, CS: CampaignSearch>(
        &self,
        kind: ToolKind,
        input: &Value,
        context: &InjectedContext,
        cache: &ContextCache<'_, H, CS>,
    ) -> Result<String, ToolError> {
        match kind {
            ToolKind::SearchCampaign => {
                let args: SearchArgs = parse_args(kind, input)?;
                let top_k = args.top_k.clamp(1, MAX_SEARCH_TOP_K);
                let category = args.category.as_deref().filter(|c| !c.trim().is_empty());
                let hits = search_with_fallback(
                    &self.search,
                    &context.user_id,
                    &context.campaign,
                    &args.query,
                    top_k,
                    category,
                )
                .await?;
                if hits.is_empty() {
                    Ok(format!("No campaign content found for '{}'.", args.query))
                } else {
                    Ok(format_hits(&hits))
                }
            }
            ToolKind::GetFileContent => {
                let args: FileArgs = parse_args(kind, input)?;
                let path = normalize_campaign_path(&context.user_id, &context.campaign, &args.file_path)?;
                self.files
                    .read(&context.user_id, &context.campaign, &path)
                    .await
            }
            ToolKind::RollDice => {
                let args: DiceArgs = parse_args(kind, input)?;
                Ok(self.dice.roll(&args.notation)?.to_string())
            }
            ToolKind::GetConversationHistory => {
                let args: HistoryArgs = parse_args(kind, input)?;
                let count = args.message_count.clamp(1, MAX_HISTORY_MESSAGES);
                let turns = cache.recent_turns(count).await;
                Ok(format_history(turns, self.history_token_budget))
            }
        }
    }
}

fn parse_args<T: DeserializeOwned>(kind: ToolKind, input: &Value) -> Result<T, ToolError> {
    serde_json::from_value(input.clone()).map_err(|e| ToolError::InvalidArguments {
        tool: kind.name().to_string(),
        reason: e.to_string(),
    })
}

/// Numbered `User:`/`Assistant:` lines, newest kept when over budget.
fn format_history(turns: &[lorekeeper_types::chat::Turn], token_budget: usize) -> String {
    if turns.is_empty() {
        return "No previous messages in this session.".to_string();
    }

    let mut lines: Vec<String> = Vec::new();
    let mut used = 0;
    for turn in turns.iter().rev() {
        let speaker = match turn.role {
            TurnRole::User => "User",
            TurnRole::Assistant => "Assistant",
        };
        let line = format!("{speaker}: {}", turn.content.trim());
        let cost = estimate_tokens(&line);
        if used + cost > token_budget && !lines.is_empty() {
            break;
        }
        used += cost;
        lines.push(line);
    }
    lines.reverse();

    lines
        .iter()
        .enumerate()
        .map(|(i, line)| format!("{}. {line}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Rough token estimate (4 chars ~ 1 token).
pub fn estimate_tokens(text: &str) -> usize {
    (text.len() / 4).max(1)
}

fn definition_for(kind: ToolKind) -> ToolDefinition {
    let (description, input_schema) = match kind {
        ToolKind::SearchCampaign => (
            "Search the user's campaign notes, NPCs, locations and lore for passages relevant to a query.",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "What to look for"},
                    "top_k": {"type": "integer", "description": "Number of passages to return", "default": DEFAULT_SEARCH_TOP_K},
                    "category": {"type": "string", "description": "Optional top-level folder to search first (e.g. npcs, locations, sessions)"}
                },
                "required": ["query"]
            }),
        ),
        ToolKind::GetFileContent => (
            "Read the full content of one campaign file, by the path shown in search results.",
            json!({
                "type": "object",
                "properties": {
                    "file_path": {"type": "string", "description": "Path relative to the campaign, e.g. npcs/mira.md"}
                },
                "required": ["file_path"]
            }),
        ),
        ToolKind::RollDice => (
            "Roll dice using standard notation such as 1d20, 2d6+3 or 4d8-1.",
            json!({
                "type": "object",
                "properties": {
                    "notation": {"type": "string", "description": "Dice notation NdM with optional +K or -K"}
                },
                "required": ["notation"]
            }),
        ),
        ToolKind::GetConversationHistory => (
            "Fetch earlier messages of the current conversation.",
            json!({
                "type": "object",
                "properties": {
                    "message_count": {"type": "integer", "description": "How many recent messages to return", "default": DEFAULT_HISTORY_MESSAGES}
                }
            }),
        ),
    };

    ToolDefinition {
        name: kind.name().to_string(),
        description: description.to_string(),
        input_schema,
    }
}
