//! Document Store Adapter (spec.md §4.3, §6 persisted state layout):
//! authoritative persistence for memory items, versions, outcomes, and
//! (via the `kg`/`registry`/`known_solutions` modules' use of
//! [`SqliteStore`]) the graph, registry, and pattern-pin tables.

mod migrations;
mod sqlite;

pub use migrations::{Migration, MIGRATIONS};
pub use sqlite::SqliteStore;

/// Sanitise a free-text query for use as an FTS5 `MATCH` argument: strip
/// FTS5 operator characters a caller's raw query might contain, then quote
/// each remaining token and OR them together, which gives "any of these
/// words" recall without FTS5 parsing user input as a query-syntax
/// expression. The pack's `keyword.rs` (grounding this adapter's call
/// site) was not present in the retrieved sources, so this is built
/// directly against the sqlite `MATCH` semantics used by `text_search`.
pub fn sanitize_fts5_query(query: &str) -> String {
    let cleaned: String = query
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();

    cleaned
        .split_whitespace()
        .filter(|tok| !tok.is_empty())
        .map(|tok| format!("\"{tok}\""))
        .collect::<Vec<_>>()
        .join(" OR ")
}
