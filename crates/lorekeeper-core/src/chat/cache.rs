//! Per-invocation cache of conversation history and campaign background.
//!
//! Each value is loaded at most once per message, on first use, and shared
//! by the prompt builder and the `get_conversation_history` tool. Load
//! failures degrade to empty context instead of failing the turn.

use tokio::sync::OnceCell;
use tracing::warn;

use lorekeeper_types::chat::Turn;
use lorekeeper_types::tool::InjectedContext;

use crate::chat::history::ChatHistoryStore;
use crate::tools::search::{CampaignSearch, format_hits};

const WORLD_QUERY: &str = "world setting themes tone style history magic system background lore";
const WORLD_TOP_K: usize = 3;
const RECENT_QUERY: &str = "recent session last game latest adventure current quest";
const RECENT_TOP_K: usize = 2;

pub struct ContextCache<'a, H: ChatHistoryStore, S: CampaignSearch> {
    history: &'a H,
    search: &'a S,
    context: &'a InjectedContext,
    turns: OnceCell<Vec<Turn>>,
    background: OnceCell<String>,
}

impl<'a, H: ChatHistoryStore, S: CampaignSearch> ContextCache<'a, H, S> {
    pub fn new(history: &'a H, search: &'a S, context: &'a InjectedContext) -> Self {
        Self {
            history,
            search,
            context,
            turns: OnceCell::new(),
            background: OnceCell::new(),
        }
    }

    /// Every stored turn of the session, oldest first.
    pub async fn turns(&self) -> &[Turn] {
        self.turns
            .get_or_init(|| async {
                match self.history.load(&self.context.session_id).await {
                    Ok(turns) => turns,
                    Err(err) => {
                        warn!(
                            session_id = %self.context.session_id,
                            error = %err,
                            "history load failed, continuing without history"
                        );
                        Vec::new()
                    }
                }
            })
            .await
    }

    /// The last `n` turns, oldest first.
    pub async fn recent_turns(&self, n: usize) -> &[Turn] {
        let turns = self.turns().await;
        &turns[turns.len().saturating_sub(n)..]
    }

    /// Campaign background: world-setting snippets plus recent-session notes.
    pub async fn background(&self) -> &str {
        self.background
            .get_or_init(|| async {
                let mut sections = Vec::new();
                if let Some(world) = self.snippets(WORLD_QUERY, WORLD_TOP_K).await {
                    sections.push(format!("World and setting:\n{world}"));
                }
                if let Some(recent) = self.snippets(RECENT_QUERY, RECENT_TOP_K).await {
                    sections.push(format!("Recent sessions:\n{recent}"));
                }
                sections.join("\n\n")
            })
            .await
    }

    async fn snippets(&self, query: &str, top_k: usize) -> Option<String> {
        let result = self
            .search
            .search(
                &self.context.user_id,
                &self.context.campaign,
                query,
                top_k,
                None,
            )
            .await;
        match result {
            Ok(hits) if !hits.is_empty() => Some(format_hits(&hits)),
            Ok(_) => None,
            Err(err) => {
                warn!(campaign = %self.context.campaign, error = %err, "background search failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::{DateTime, Utc};
    use lorekeeper_types::chat::SessionSummary;
    use lorekeeper_types::error::{RepositoryError, ToolError};
    use lorekeeper_types::tool::SearchHit;

    use super::*;

    struct CountingHistory {
        turns: Vec<Turn>,
        loads: AtomicUsize,
    }

    impl ChatHistoryStore for CountingHistory {
        async fn load(&self, _session_id: &str) -> Result<Vec<Turn>, RepositoryError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(self.turns.clone())
        }

        async fn append(&self, _: &str, _: &str, _: &[Turn], _: i64) -> Result<(), RepositoryError> {
            Ok(())
        }

        async fn list_sessions(&self, _: &str) -> Result<Vec<SessionSummary>, RepositoryError> {
            Ok(vec![])
        }

        async fn purge_expired(&self, _: DateTime<Utc>) -> Result<u64, RepositoryError> {
            Ok(0)
        }
    }

    struct RecordingSearch {
        fail: bool,
        queries: Mutex<Vec<(String, usize)>>,
    }

    impl CampaignSearch for RecordingSearch {
        async fn search(
            &self,
            _user_id: &str,
            _campaign: &str,
            query: &str,
            top_k: usize,
            _category: Option<&str>,
        ) -> Result<Vec<SearchHit>, ToolError> {
            self.queries.lock().unwrap().push((query.to_string(), top_k));
            if self.fail {
                return Err(ToolError::Upstream("index offline".to_string()));
            }
            Ok(vec![SearchHit {
                file_path: "lore/world.md".to_string(),
                category: Some("lore".to_string()),
                chunk_text: "The empire fell.".to_string(),
                distance: 0.2,
            }])
        }
    }

    fn context() -> InjectedContext {
        InjectedContext {
            user_id: "u1".to_string(),
            campaign: "ashes".to_string(),
            session_id: "u1-s1".to_string(),
        }
    }

    #[tokio::test]
    async fn history_loaded_once_per_invocation() {
        let history = CountingHistory {
            turns: vec![
                Turn::user("u1-s1", "a"),
                Turn::assistant("u1-s1", "b"),
                Turn::user("u1-s1", "c"),
            ],
            loads: AtomicUsize::new(0),
        };
        let search = RecordingSearch {
            fail: false,
            queries: Mutex::new(vec![]),
        };
        let ctx = context();
        let cache = ContextCache::new(&history, &search, &ctx);

        assert_eq!(cache.turns().await.len(), 3);
        let recent = cache.recent_turns(2).await;
        assert_eq!(recent[0].content, "b");
        assert_eq!(recent[1].content, "c");
        assert_eq!(cache.recent_turns(10).await.len(), 3);
        assert_eq!(history.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn background_runs_both_queries_once() {
        let history = CountingHistory {
            turns: vec![],
            loads: AtomicUsize::new(0),
        };
        let search = RecordingSearch {
            fail: false,
            queries: Mutex::new(vec![]),
        };
        let ctx = context();
        let cache = ContextCache::new(&history, &search, &ctx);

        let background = cache.background().await.to_string();
        assert!(background.contains("The empire fell."));
        cache.background().await;

        let queries = search.queries.lock().unwrap();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0], (WORLD_QUERY.to_string(), 3));
        assert_eq!(queries[1], (RECENT_QUERY.to_string(), 2));
    }

    #[tokio::test]
    async fn search_failure_degrades_to_empty_background() {
        let history = CountingHistory {
            turns: vec![],
            loads: AtomicUsize::new(0),
        };
        let search = RecordingSearch {
            fail: true,
            queries: Mutex::new(vec![]),
        };
        let ctx = context();
        let cache = ContextCache::new(&history, &search, &ctx);

        assert!(cache.background().await.is_empty());
    }
}
