//! Logical-session identity resolution.
//!
//! The external runtime assigns each session an opaque id and reveals it
//! asynchronously, often first on a side-channel event rather than on the
//! session's own data path. With several sessions running concurrently the
//! only correlation signals available are creation order and first-touch
//! order, so binding is best-effort: a runtime id binds to at most one
//! logical session, and once bound it never changes.

use std::collections::{HashMap, VecDeque};

use braid_core::ids::{RuntimeSessionId, SessionId};
use tracing::{debug, trace};

/// A durable logical session handle.
#[derive(Debug)]
struct LogicalSession {
    /// Runtime id bound to this session, once discovered.
    runtime_id: Option<RuntimeSessionId>,
    /// Whether the session has been closed (stopped).
    closed: bool,
    /// Whether the session has started doing work (sent its first prompt).
    has_started_work: bool,
}

/// Binds opaque runtime session ids to logical session handles.
#[derive(Debug, Default)]
pub struct SessionIdentityResolver {
    sessions: HashMap<SessionId, LogicalSession>,
    /// Unbound sessions in creation order.
    pending: VecDeque<SessionId>,
}

impl SessionIdentityResolver {
    /// Create an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a logical session at creation time. Idempotent.
    pub fn create(&mut self, id: SessionId) {
        if self.sessions.contains_key(&id) {
            return;
        }
        let _ = self.sessions.insert(
            id.clone(),
            LogicalSession {
                runtime_id: None,
                closed: false,
                has_started_work: false,
            },
        );
        self.pending.push_back(id);
    }

    /// Mark a session as having started work. No-op for unknown ids.
    pub fn mark_started(&mut self, id: &SessionId) {
        if let Some(session) = self.sessions.get_mut(id) {
            session.has_started_work = true;
        }
    }

    /// Mark a session closed. It stays registered (a bound runtime id keeps
    /// resolving to it) but is skipped as a binding candidate.
    pub fn close(&mut self, id: &SessionId) {
        if let Some(session) = self.sessions.get_mut(id) {
            session.closed = true;
        }
    }

    /// Remove a session entirely, including any pending-binding entry.
    pub fn destroy(&mut self, id: &SessionId) {
        let _ = self.sessions.remove(id);
        self.pending.retain(|pending_id| pending_id != id);
    }

    /// The runtime id bound to a session, if any.
    #[must_use]
    pub fn binding(&self, id: &SessionId) -> Option<&RuntimeSessionId> {
        self.sessions.get(id).and_then(|s| s.runtime_id.as_ref())
    }

    /// Whether a logical session id is registered.
    #[must_use]
    pub fn is_registered(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no sessions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Resolve a runtime session id to a logical session id.
    ///
    /// Resolution order:
    ///
    /// 1. the runtime id already *is* a known logical id;
    /// 2. a session is already bound to this runtime id;
    /// 3. the oldest pending session that is open, has started work, and is
    ///    not bound elsewhere, which gets bound and dequeued;
    /// 4. the single open, unbound session, if exactly one exists (covers the
    ///    first event arriving before the session's own data path would have
    ///    populated the id);
    /// 5. no candidate: the raw runtime id passes through unresolved.
    ///
    /// Never blocks, never fails. Binding mutates the chosen session.
    pub fn resolve(&mut self, runtime_id: &RuntimeSessionId) -> SessionId {
        // (1) Runtime id equals a known logical id.
        let as_logical = SessionId::from(runtime_id.as_str());
        if self.sessions.contains_key(&as_logical) {
            return as_logical;
        }

        // (2) Already bound.
        if let Some(id) = self.bound_session(runtime_id) {
            return id;
        }

        // (3) Oldest eligible pending session. The has-started-work guard
        // keeps a side-channel event meant for a busy session from being
        // misattributed to an untouched one.
        if let Some(position) = self.pending.iter().position(|id| {
            self.sessions.get(id).is_some_and(|s| {
                !s.closed && s.has_started_work && s.runtime_id.is_none()
            })
        }) {
            if let Some(id) = self.pending.remove(position) {
                self.bind(&id, runtime_id);
                return id;
            }
        }

        // (4) Exactly one open, unbound session in the whole registry.
        let mut open_unbound = self
            .sessions
            .iter()
            .filter(|(_, s)| !s.closed && s.runtime_id.is_none())
            .map(|(id, _)| id.clone());
        if let (Some(id), None) = (open_unbound.next(), open_unbound.next()) {
            self.pending.retain(|pending_id| pending_id != &id);
            self.bind(&id, runtime_id);
            return id;
        }

        // (5) Ambiguous: pass the raw id through rather than guessing.
        debug!(runtime_id = %runtime_id, "runtime session id left unresolved");
        SessionId::from(runtime_id.as_str())
    }

    /// Drop all sessions and pending bindings.
    pub fn reset(&mut self) {
        self.sessions.clear();
        self.pending.clear();
    }

    fn bound_session(&self, runtime_id: &RuntimeSessionId) -> Option<SessionId> {
        self.sessions
            .iter()
            .find(|(_, s)| s.runtime_id.as_ref() == Some(runtime_id))
            .map(|(id, _)| id.clone())
    }

    fn bind(&mut self, id: &SessionId, runtime_id: &RuntimeSessionId) {
        if let Some(session) = self.sessions.get_mut(id) {
            trace!(session_id = %id, runtime_id = %runtime_id, "bound runtime session id");
            session.runtime_id = Some(runtime_id.clone());
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
