//! Knowledge Graph Service (spec.md §4.7): three coordinated per-user
//! graphs - routing (tier planning), content (entity co-occurrence), and
//! action (per-context action effectiveness) - sharing one write-behind
//! buffer discipline and the document store's connection pool.

mod action;
mod buffer;
mod content;
mod entities;
mod routing;

pub use action::{
    detect_context_type, ActionKg, ActionRecommendation, ContextInsights, ContextType,
    Recommendation,
};
pub use buffer::WriteBuffer;
pub use content::ContentKg;
pub use entities::extract_entities;
pub use routing::{RoutingKg, TierPlan, TierPlanSource};
