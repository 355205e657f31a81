use chrono::{DateTime, Utc};

use kardex_core::{AggregateId, ProjectId};

/// A committed fact about one logistics aggregate.
///
/// Every event names the project and aggregate it belongs to, so a publishable
/// envelope can be built from the event alone.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Aggregate family tag, e.g. `"inventory.item"`.
    const AGGREGATE_TYPE: &'static str;

    /// Dotted event name, e.g. `"inventory.movement.recorded"`.
    fn event_type(&self) -> &'static str;

    /// Payload schema revision. Bump on breaking payload changes.
    fn schema_version(&self) -> u32 {
        1
    }

    fn project_id(&self) -> ProjectId;

    fn aggregate_id(&self) -> AggregateId;

    /// Business time of the fact.
    fn occurred_at(&self) -> DateTime<Utc>;
}
