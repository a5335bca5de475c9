//! Error types for the braid core.
//!
//! The correlation engine is deliberately non-throwing: unresolvable
//! identities, missing correlations, and malformed echo targets all degrade
//! to best-effort defaults. The one genuinely fallible surface is decoding an
//! opaque event payload into its typed form.

use crate::events::EventType;

/// Failure to decode a raw event payload into its typed representation.
///
/// Produced by [`crate::events::RuntimeEvent::typed_payload`]. Callers in the
/// enrichment path treat this as "payload carries no usable fields" and fall
/// back to default enrichment rather than propagating.
#[derive(Debug, thiserror::Error)]
#[error("failed to decode `{event_type}` payload: {source}")]
pub struct EventDecodeError {
    /// Event type whose payload failed to decode.
    pub event_type: EventType,
    /// Underlying serde error.
    #[source]
    pub source: serde_json::Error,
}
