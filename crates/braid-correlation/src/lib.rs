//! # braid-correlation
//!
//! The stateful components of the braid correlation engine:
//!
//! - **[`SessionIdentityResolver`]**: binds opaque runtime session ids to
//!   logical session handles using creation/first-touch order.
//! - **[`SubagentIdentityTracker`]**: binds sub-agent spawn records to the
//!   runtime ids discovered via their first tool event (FIFO heuristic).
//! - **[`CorrelationService`]**: per-run enrichment that resolves tool/agent
//!   ownership and UI-routing flags for every event.
//! - **[`EchoSuppressor`]**: streaming FIFO matcher that withholds
//!   tool-result text echoed back into assistant prose.
//!
//! The components are independent; the caller (see `braid-pipeline`)
//! composes them. None of them block, panic, or return errors; every
//! ambiguity degrades to best-effort defaults.
//!
//! ## Crate Position
//!
//! Engine layer. Depends on: braid-core. Depended on by: braid-pipeline.

#![deny(unsafe_code)]

pub mod echo;
pub mod service;
pub mod session;
pub mod subagent;

pub use echo::EchoSuppressor;
pub use service::{CorrelationService, SubagentInfo};
pub use session::SessionIdentityResolver;
pub use subagent::SubagentIdentityTracker;
