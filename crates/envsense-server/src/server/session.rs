//! Lifecycle plumbing shared by every streaming RPC.
//!
//! A [`StreamSession`] is created by the [`SessionTracker`] when a forecast,
//! upload or chat stream is accepted, and lives for as long as the task
//! driving that stream. It carries a unique id, a kind used for logs and
//! metrics, and a [`CancellationToken`] derived from the tracker's shutdown
//! token. Dropping the session marks it finished.
//!
//! Shutdown follows the same phases as a drained worker pool: refuse new
//! sessions, give in-flight sessions a bounded grace period, then cancel
//! whatever is left.

use crate::server::telemetry::{
    decrement_sessions_inflight, increment_sessions_inflight, increment_sessions_opened,
    record_session_duration,
};
use core::{fmt, time::Duration};
use envsense_core::Error;
use portable_atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::{sync::Arc, time::Instant};
use tokio::{sync::Notify, time::timeout};
use tokio_util::sync::CancellationToken;

/// Process-unique identifier of a session.
pub type SessionId = u64;

/// The RPC shape a session serves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionKind {
    /// Server-streaming water quality forecast.
    Forecast,
    /// Client-streaming water sample upload.
    Upload,
    /// Bidirectional customer support chat.
    Chat,
}

impl SessionKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Forecast => "forecast",
            Self::Upload => "upload",
            Self::Chat => "chat",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Issues sessions and coordinates their shutdown.
pub struct SessionTracker {
    next_id: AtomicU64,
    inflight: AtomicUsize,
    drained: Notify,
    accepting: AtomicBool,
    shutdown_token: CancellationToken,
    shutdown_timeout: Duration,
}

impl SessionTracker {
    pub fn new(shutdown_timeout: Duration) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            inflight: AtomicUsize::new(0),
            drained: Notify::new(),
            accepting: AtomicBool::new(true),
            shutdown_token: CancellationToken::new(),
            shutdown_timeout,
        }
    }

    /// Opens a new session of the given kind.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceShutdown`] once [`SessionTracker::shutdown`]
    /// has started.
    pub fn open(self: &Arc<Self>, kind: SessionKind) -> Result<StreamSession, Error> {
        if !self.accepting.load(Ordering::Acquire) || self.shutdown_token.is_cancelled() {
            return Err(Error::ServiceShutdown);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let inflight = self.inflight.fetch_add(1, Ordering::AcqRel) + 1;
        increment_sessions_opened(kind);
        increment_sessions_inflight(kind);
        tracing::debug!(session = id, %kind, inflight, "Session opened");

        Ok(StreamSession {
            id,
            kind,
            token: self.shutdown_token.child_token(),
            started: Instant::now(),
            tracker: Arc::clone(self),
        })
    }

    /// Number of sessions that have been opened and not yet dropped.
    pub fn inflight(&self) -> usize {
        self.inflight.load(Ordering::Acquire)
    }

    pub fn is_shutting_down(&self) -> bool {
        !self.accepting.load(Ordering::Acquire)
    }

    /// Gracefully shuts down every session.
    ///
    /// - Refuses new sessions.
    /// - Waits up to `shutdown_timeout` for in-flight sessions to finish.
    /// - Cancels the shared token so remaining sessions stop.
    pub async fn shutdown(&self) {
        // === Phase 0: Stop accepting new sessions ===
        tracing::info!("Refusing new sessions");
        self.accepting.store(false, Ordering::Release);

        // === Phase 1: Wait for in-flight sessions to drain ===
        tracing::info!(active = self.inflight(), "Draining in-flight sessions");
        let drain_result = timeout(self.shutdown_timeout, async {
            loop {
                // Registered before the check so a concurrent last drop
                // cannot be missed.
                let drained = self.drained.notified();
                if self.inflight() == 0 {
                    break;
                }
                drained.await;
            }
        })
        .await;

        match drain_result {
            Ok(()) => tracing::debug!("All in-flight sessions drained"),
            Err(_) => tracing::warn!(
                active = self.inflight(),
                "Graceful drain timed out, cancelling remaining sessions"
            ),
        }

        // === Phase 2: Cancel any remaining sessions ===
        self.shutdown_token.cancel();
    }
}

/// One open streaming RPC.
pub struct StreamSession {
    id: SessionId,
    kind: SessionKind,
    token: CancellationToken,
    started: Instant,
    tracker: Arc<SessionTracker>,
}

impl StreamSession {
    pub const fn id(&self) -> SessionId {
        self.id
    }

    pub const fn kind(&self) -> SessionKind {
        self.kind
    }

    /// Token cancelled when the service shuts down or the session is
    /// cancelled explicitly.
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancels this session only. Other sessions are unaffected.
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

impl fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSession")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("cancelled", &self.token.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        let remaining = self.tracker.inflight.fetch_sub(1, Ordering::AcqRel) - 1;
        if remaining == 0 {
            self.tracker.drained.notify_waiters();
        }
        decrement_sessions_inflight(self.kind);
        record_session_duration(self.kind, self.started.elapsed().as_millis() as f64);
        tracing::debug!(
            session = self.id,
            kind = %self.kind,
            inflight = remaining,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Session closed"
        );
    }
}
