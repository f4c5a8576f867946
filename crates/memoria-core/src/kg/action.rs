//! Action KG (spec.md §4.7): tracks which actions (tool calls, tier
//! choices) work well in which conversational context, attributed
//! exactly once per outcome event via a per-turn buffer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rusqlite::params;

use crate::error::StorageResult;
use crate::kg::content::ContentKg;
use crate::kg::routing::{RoutingKg, TierPlan};
use crate::memory::{OutcomeKind, Tier};
use crate::MemoryStore;
use crate::store::SqliteStore;
use crate::wilson::wilson_default;

const MAX_EXAMPLES: usize = 20;

/// Fixed-order, case-insensitive, bilingual rule list; the first match wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextType {
    Docker,
    Debugging,
    DatagovQuery,
    DocRag,
    CodingHelp,
    WebSearch,
    MemoryManagement,
    General,
}

impl ContextType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextType::Docker => "docker",
            ContextType::Debugging => "debugging",
            ContextType::DatagovQuery => "datagov_query",
            ContextType::DocRag => "doc_rag",
            ContextType::CodingHelp => "coding_help",
            ContextType::WebSearch => "web_search",
            ContextType::MemoryManagement => "memory_management",
            ContextType::General => "general",
        }
    }
}

const RULES: &[(ContextType, &[&str])] = &[
    (ContextType::Docker, &["docker", "container", "דוקר", "קונטיינר"]),
    (ContextType::Debugging, &["debug", "stack trace", "exception", "ניפוי באגים", "שגיאה"]),
    (ContextType::DatagovQuery, &["data.gov", "datagov", "dataset", "מאגר נתונים"]),
    (ContextType::DocRag, &["pdf", "document", "summarize this", "מסמך", "סכם"]),
    (ContextType::CodingHelp, &["function", "compile", "refactor", "קוד", "פונקציה"]),
    (ContextType::WebSearch, &["search the web", "look up", "google", "חפש באינטרנט"]),
    (ContextType::MemoryManagement, &["remember this", "forget", "my memories", "זכור", "תשכח"]),
];

/// Checks `query`, then `recent_messages`, against the fixed rule list in
/// precedence order; the first substring match wins.
pub fn detect_context_type(query: &str, recent_messages: &[String]) -> ContextType {
    let haystacks: Vec<String> = std::iter::once(query.to_string())
        .chain(recent_messages.iter().cloned())
        .map(|s| s.to_lowercase())
        .collect();

    for (context, keywords) in RULES {
        if haystacks.iter().any(|h| keywords.iter().any(|k| h.contains(k))) {
            return *context;
        }
    }
    ContextType::General
}

#[derive(Debug, Clone)]
struct RecordedAction {
    action: String,
    tier: Option<Tier>,
    memory_ids: Vec<String>,
    tool_name: Option<String>,
}

#[derive(Debug, Clone)]
struct Turn {
    context_type: ContextType,
    #[allow(dead_code)]
    query: String,
    actions: Vec<RecordedAction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recommendation {
    Preferred,
    Neutral,
    Avoid,
}

#[derive(Debug, Clone)]
pub struct ActionRecommendation {
    pub action: String,
    pub tier: Option<Tier>,
    pub wilson_score: f64,
    pub recommendation: Recommendation,
}

#[derive(Debug, Clone)]
pub struct ContextInsights {
    pub tier_plan: TierPlan,
    pub action_recommendations: Vec<ActionRecommendation>,
    pub related_entities: Vec<String>,
}

pub struct ActionKg {
    store: Arc<SqliteStore>,
    content: Arc<ContentKg>,
    routing: Arc<RoutingKg>,
    turns: Mutex<HashMap<(String, String), Turn>>,
}

impl ActionKg {
    pub fn new(store: Arc<SqliteStore>, content: Arc<ContentKg>, routing: Arc<RoutingKg>) -> Self {
        Self {
            store,
            content,
            routing,
            turns: Mutex::new(HashMap::new()),
        }
    }

    pub fn start_turn(&self, conversation_id: &str, turn_id: &str, context_type: ContextType, query: &str) {
        self.turns.lock().unwrap().insert(
            (conversation_id.to_string(), turn_id.to_string()),
            Turn {
                context_type,
                query: query.to_string(),
                actions: Vec::new(),
            },
        );
    }

    pub fn record_action(
        &self,
        conversation_id: &str,
        turn_id: &str,
        action: &str,
        tier: Option<Tier>,
        memory_ids: Vec<String>,
        tool_name: Option<String>,
    ) {
        if let Some(turn) = self
            .turns
            .lock()
            .unwrap()
            .get_mut(&(conversation_id.to_string(), turn_id.to_string()))
        {
            turn.actions.push(RecordedAction {
                action: action.to_string(),
                tier,
                memory_ids,
                tool_name,
            });
        }
    }

    /// Drains the turn's buffer into upserts against action-effectiveness
    /// records, then discards the buffer - exactly-once attribution
    /// relative to this outcome event.
    pub fn apply_outcome_to_turn(
        &self,
        user_id: &str,
        conversation_id: &str,
        turn_id: &str,
        outcome: OutcomeKind,
    ) -> StorageResult<()> {
        let turn = self
            .turns
            .lock()
            .unwrap()
            .remove(&(conversation_id.to_string(), turn_id.to_string()));
        let Some(turn) = turn else { return Ok(()) };

        let outcome_col = match outcome {
            OutcomeKind::Worked => "worked",
            OutcomeKind::Partial => "partial",
            OutcomeKind::Unknown => "unknown_outcome",
            OutcomeKind::Failed => "failed",
        };
        let weight = outcome.success_weight();
        let now = chrono::Utc::now().to_rfc3339();
        let context_str = turn.context_type.as_str();

        let mut conn = self.store.writer();
        let tx = conn.transaction()?;
        for action in &turn.actions {
            let tier_key = action.tier.map(|t| t.as_str()).unwrap_or("");
            tx.execute(
                "INSERT INTO kg_action_effectiveness (user_id, context_type, action, tier, uses, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, 0, ?5) \
                 ON CONFLICT(user_id, context_type, action, tier) DO NOTHING",
                params![user_id, context_str, action.action, tier_key, now],
            )?;
            tx.execute(
                &format!(
                    "UPDATE kg_action_effectiveness SET uses = uses + 1, {outcome_col} = {outcome_col} + 1, \
                        success_count = success_count + ?1, updated_at = ?2 \
                     WHERE user_id = ?3 AND context_type = ?4 AND action = ?5 AND tier = ?6"
                ),
                params![weight, now, user_id, context_str, action.action, tier_key],
            )?;

            let (uses, success_count, examples_json): (i64, f64, String) = tx.query_row(
                "SELECT uses, success_count, examples FROM kg_action_effectiveness \
                 WHERE user_id = ?1 AND context_type = ?2 AND action = ?3 AND tier = ?4",
                params![user_id, context_str, action.action, tier_key],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )?;
            let wilson = wilson_default(success_count, uses as u32);
            let mut examples: Vec<String> = serde_json::from_str(&examples_json).unwrap_or_default();
            if let Some(tool) = &action.tool_name {
                examples.push(tool.clone());
            }
            if examples.len() > MAX_EXAMPLES {
                let excess = examples.len() - MAX_EXAMPLES;
                examples.drain(0..excess);
            }
            let examples_json = serde_json::to_string(&examples).unwrap_or_else(|_| "[]".to_string());
            tx.execute(
                "UPDATE kg_action_effectiveness SET wilson_score = ?1, examples = ?2 \
                 WHERE user_id = ?3 AND context_type = ?4 AND action = ?5 AND tier = ?6",
                params![wilson, examples_json, user_id, context_str, action.action, tier_key],
            )?;
        }
        tx.commit()?;

        for action in &turn.actions {
            self.store
                .record_action_outcome(user_id, context_str, &action.action, action.tier, outcome)?;
            if !action.memory_ids.is_empty() {
                // Memory references participating in this turn's actions are
                // content-KG candidates too, but entity extraction from the
                // action payload itself is out of scope here.
            }
        }

        Ok(())
    }

    pub fn get_action_recommendations(
        &self,
        user_id: &str,
        context_type: ContextType,
    ) -> StorageResult<Vec<ActionRecommendation>> {
        let conn = self.store.reader();
        let mut stmt = conn.prepare(
            "SELECT action, tier, wilson_score FROM kg_action_effectiveness \
             WHERE user_id = ?1 AND context_type = ?2 ORDER BY wilson_score DESC",
        )?;
        let rows: Vec<(String, String, f64)> = stmt
            .query_map(params![user_id, context_type.as_str()], |r| {
                Ok((r.get(0)?, r.get(1)?, r.get(2)?))
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(rows
            .into_iter()
            .map(|(action, tier_str, wilson_score)| {
                let recommendation = if wilson_score >= 0.6 {
                    Recommendation::Preferred
                } else if wilson_score <= 0.4 {
                    Recommendation::Avoid
                } else {
                    Recommendation::Neutral
                };
                ActionRecommendation {
                    action,
                    tier: Tier::parse_name(&tier_str),
                    wilson_score,
                    recommendation,
                }
            })
            .collect())
    }

    pub fn get_context_insights(
        &self,
        user_id: &str,
        context_type: ContextType,
        concepts: &[String],
    ) -> StorageResult<ContextInsights> {
        let tier_plan = self.routing.get_tier_plan(user_id, concepts)?;
        let action_recommendations = self.get_action_recommendations(user_id, context_type)?;
        let related_entities = self.content.get_related_entities(user_id, concepts, 10)?;
        Ok(ContextInsights {
            tier_plan,
            action_recommendations,
            related_entities,
        })
    }

    pub fn cleanup_memory_references(&self, user_id: &str, memory_id: &str) -> StorageResult<()> {
        self.content.cleanup_memory_references(user_id, memory_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action_kg() -> ActionKg {
        let store = Arc::new(SqliteStore::open(None).unwrap());
        let content = Arc::new(ContentKg::new(store.clone(), true));
        let routing = Arc::new(RoutingKg::new(store.clone()));
        ActionKg::new(store, content, routing)
    }

    #[test]
    fn docker_keyword_is_detected_before_general() {
        assert_eq!(detect_context_type("how do I restart my docker container", &[]), ContextType::Docker);
        assert_eq!(detect_context_type("what's the weather today", &[]), ContextType::General);
    }

    #[test]
    fn turn_lifecycle_records_action_effectiveness() {
        let kg = action_kg();
        kg.start_turn("c1", "t1", ContextType::Docker, "restart container");
        kg.record_action("c1", "t1", "search_memory", Some(Tier::Patterns), vec!["m1".to_string()], None);
        kg.apply_outcome_to_turn("u1", "c1", "t1", OutcomeKind::Worked).unwrap();

        let recs = kg.get_action_recommendations("u1", ContextType::Docker).unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].action, "search_memory");
        assert_eq!(recs[0].recommendation, Recommendation::Preferred);
    }

    #[test]
    fn applying_outcome_discards_the_turn_buffer() {
        let kg = action_kg();
        kg.start_turn("c1", "t1", ContextType::General, "hi");
        kg.record_action("c1", "t1", "reply", None, vec![], None);
        kg.apply_outcome_to_turn("u1", "c1", "t1", OutcomeKind::Worked).unwrap();
        // Second call finds no buffered turn and is a no-op, not an error.
        kg.apply_outcome_to_turn("u1", "c1", "t1", OutcomeKind::Failed).unwrap();
        let recs = kg.get_action_recommendations("u1", ContextType::General).unwrap();
        assert_eq!(recs[0].wilson_score, wilson_default(1.0, 1));
    }
}
