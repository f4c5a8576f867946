//! Routing KG (spec.md §4.7): per-concept, per-tier effectiveness used to
//! plan which tiers a query should search before spending the retrieval
//! budget on all seven.

use std::sync::Arc;

use rusqlite::params;

use crate::error::StorageResult;
use crate::memory::{OutcomeKind, Tier};
use crate::store::SqliteStore;
use crate::wilson::wilson_default;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierPlanSource {
    RoutingKg,
    Default,
    Explicit,
}

#[derive(Debug, Clone)]
pub struct TierPlan {
    pub tiers: Vec<Tier>,
    pub source: TierPlanSource,
    pub confidence: f64,
}

impl TierPlan {
    fn default_plan() -> Self {
        Self {
            tiers: Tier::all().to_vec(),
            source: TierPlanSource::Default,
            confidence: 0.3,
        }
    }
}

pub struct RoutingKg {
    store: Arc<SqliteStore>,
}

impl RoutingKg {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self { store }
    }

    /// `Explicit` is returned by callers who already picked tiers
    /// themselves (e.g. a user-pinned tier filter); this service only
    /// ever returns `RoutingKg` or `Default`.
    pub fn get_tier_plan(&self, user_id: &str, concepts: &[String]) -> StorageResult<TierPlan> {
        if concepts.is_empty() {
            return Ok(TierPlan::default_plan());
        }

        let conn = self.store.reader();
        let placeholders = concepts.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT tier, wilson_score FROM kg_routing_stats \
             WHERE user_id = ? AND concept_id IN ({placeholders})"
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rusqlite_params: Vec<&dyn rusqlite::ToSql> = vec![&user_id];
        for c in concepts {
            rusqlite_params.push(c);
        }
        let rows: Vec<(String, f64)> = stmt
            .query_map(rusqlite_params.as_slice(), |r| Ok((r.get(0)?, r.get(1)?)))?
            .filter_map(|r| r.ok())
            .collect();
        drop(stmt);
        drop(conn);

        if rows.is_empty() {
            return Ok(TierPlan::default_plan());
        }

        let mut per_tier: std::collections::HashMap<Tier, f64> = std::collections::HashMap::new();
        let mut total_wilson = 0.0;
        for (tier_str, wilson) in &rows {
            if let Some(tier) = Tier::parse_name(tier_str) {
                *per_tier.entry(tier).or_insert(0.0) += wilson;
            }
            total_wilson += wilson;
        }

        let mut strong: Vec<(Tier, f64)> = per_tier
            .iter()
            .filter(|(tier, score)| **tier != Tier::Working && **score > 0.3)
            .map(|(t, s)| (*t, *s))
            .collect();
        strong.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        strong.truncate(3);

        if strong.len() < 2 {
            return Ok(TierPlan {
                tiers: Tier::all().to_vec(),
                source: TierPlanSource::Default,
                confidence: 0.4,
            });
        }

        let mut tiers = vec![Tier::Working];
        tiers.extend(strong.iter().map(|(t, _)| *t));

        let confidence = (total_wilson / rows.len() as f64).min(0.95);

        Ok(TierPlan {
            tiers,
            source: TierPlanSource::RoutingKg,
            confidence,
        })
    }

    /// Bulk upsert across all `(concept, tier)` pairs named by `concepts` x
    /// `tiers`, wrapped in one transaction to avoid per-concept round trips.
    pub fn update_routing_stats(
        &self,
        user_id: &str,
        concepts: &[String],
        tiers: &[Tier],
        outcome: OutcomeKind,
    ) -> StorageResult<()> {
        if concepts.is_empty() || tiers.is_empty() {
            return Ok(());
        }

        let outcome_col = match outcome {
            OutcomeKind::Worked => "worked",
            OutcomeKind::Partial => "partial",
            OutcomeKind::Unknown => "unknown_outcome",
            OutcomeKind::Failed => "failed",
        };
        let now = chrono::Utc::now().to_rfc3339();

        let mut conn = self.store.writer();
        let tx = conn.transaction()?;
        for concept in concepts {
            for tier in tiers {
                tx.execute(
                    "INSERT INTO kg_routing_stats (user_id, concept_id, tier, uses, last_used_at) \
                     VALUES (?1, ?2, ?3, 0, ?4) \
                     ON CONFLICT(user_id, concept_id, tier) DO NOTHING",
                    params![user_id, concept, tier.as_str(), now],
                )?;
                tx.execute(
                    &format!(
                        "UPDATE kg_routing_stats SET uses = uses + 1, {outcome_col} = {outcome_col} + 1, \
                            last_used_at = ?1 \
                         WHERE user_id = ?2 AND concept_id = ?3 AND tier = ?4"
                    ),
                    params![now, user_id, concept, tier.as_str()],
                )?;
                let (uses, worked, partial, unknown, failed): (i64, i64, i64, i64, i64) = tx.query_row(
                    "SELECT uses, worked, partial, unknown_outcome, failed FROM kg_routing_stats \
                     WHERE user_id = ?1 AND concept_id = ?2 AND tier = ?3",
                    params![user_id, concept, tier.as_str()],
                    |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
                )?;
                let success_count = worked as f64 + partial as f64 * 0.5 + unknown as f64 * 0.25;
                let success_rate = if uses > 0 { success_count / uses as f64 } else { 0.0 };
                let wilson = wilson_default(success_count, uses as u32);
                tx.execute(
                    "UPDATE kg_routing_stats SET success_rate = ?1, wilson_score = ?2 \
                     WHERE user_id = ?3 AND concept_id = ?4 AND tier = ?5",
                    params![success_rate, wilson, user_id, concept, tier.as_str()],
                )?;
            }

            let mut best_stmt = tx.prepare(
                "SELECT tier, wilson_score FROM kg_routing_stats \
                 WHERE user_id = ?1 AND concept_id = ?2 AND wilson_score > 0.5 \
                 ORDER BY wilson_score DESC",
            )?;
            let best_tiers: Vec<String> = best_stmt
                .query_map(params![user_id, concept], |r| r.get::<_, String>(0))?
                .filter_map(|r| r.ok())
                .collect();
            drop(best_stmt);
            let best_tiers_json = serde_json::to_string(&best_tiers).unwrap_or_else(|_| "[]".to_string());
            tx.execute(
                "INSERT INTO kg_routing_concepts (user_id, concept_id, best_tiers, updated_at) \
                 VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT(user_id, concept_id) DO UPDATE SET best_tiers = excluded.best_tiers, updated_at = excluded.updated_at",
                params![user_id, concept, best_tiers_json, now],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn routing() -> RoutingKg {
        RoutingKg::new(Arc::new(SqliteStore::open(None).unwrap()))
    }

    #[test]
    fn no_concepts_returns_default_plan() {
        let r = routing();
        let plan = r.get_tier_plan("u1", &[]).unwrap();
        assert_eq!(plan.source, TierPlanSource::Default);
        assert_eq!(plan.tiers.len(), 7);
        assert_eq!(plan.confidence, 0.3);
    }

    #[test]
    fn unseen_concept_falls_back_to_default() {
        let r = routing();
        let plan = r.get_tier_plan("u1", &["docker".to_string()]).unwrap();
        assert_eq!(plan.source, TierPlanSource::Default);
    }

    #[test]
    fn strong_signal_narrows_tiers() {
        let r = routing();
        for _ in 0..5 {
            r.update_routing_stats(
                "u1",
                &["docker".to_string()],
                &[Tier::Patterns, Tier::History],
                OutcomeKind::Worked,
            )
            .unwrap();
        }
        let plan = r.get_tier_plan("u1", &["docker".to_string()]).unwrap();
        assert_eq!(plan.source, TierPlanSource::RoutingKg);
        assert!(plan.tiers.contains(&Tier::Working));
        assert!(plan.tiers.contains(&Tier::Patterns));
        assert!(plan.tiers.contains(&Tier::History));
    }
}
