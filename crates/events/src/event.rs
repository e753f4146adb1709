use chrono::{DateTime, Utc};

/// A fact recorded against an aggregate stream.
///
/// Implementations are plain data: once an aggregate has decided one it is
/// appended and never edited. `event_type` doubles as the routing key
/// projections and subscribers match on, so it must stay stable even when the
/// payload schema evolves.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable dotted name, `<module>.<aggregate>.<action>`
    /// (e.g. "build.kit.completed").
    fn event_type(&self) -> &'static str;

    /// Payload schema version, bumped when the shape changes.
    fn version(&self) -> u32;

    /// Business time: when the fact happened, not when it was stored.
    fn occurred_at(&self) -> DateTime<Utc>;
}
