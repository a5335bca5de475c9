//! # braid-core
//!
//! Foundation types for the braid event-correlation engine.
//!
//! This crate provides the shared vocabulary the other braid crates depend on:
//!
//! - **Branded IDs**: [`ids::SessionId`], [`ids::RuntimeSessionId`],
//!   [`ids::AgentId`], [`ids::ToolCallId`] as newtypes, plus the numeric
//!   [`ids::RunId`]
//! - **Events**: [`events::RuntimeEvent`] — the raw runtime event envelope
//!   with opaque payload and typed access via
//!   [`events::RuntimeEvent::typed_payload()`]
//! - **Enrichment**: [`events::EnrichedEvent`] — a raw event plus resolved
//!   ownership and UI-routing flags
//! - **Errors**: [`errors::EventDecodeError`] via `thiserror`
//! - **Logging**: [`logging::init_subscriber`] for `tracing` setup
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by `braid-correlation` and `braid-pipeline`.

#![deny(unsafe_code)]

pub mod errors;
pub mod events;
pub mod ids;
pub mod logging;
