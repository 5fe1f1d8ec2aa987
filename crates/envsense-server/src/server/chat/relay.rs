use crate::server::{
    chat::registry::{ChatRegistry, Outbound},
    session::StreamSession,
    telemetry::increment_stream_errors,
};
use envsense_core::{Error, proto::support::ChatMessage};
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tonic::Status;

/// Where a relay is in its lifecycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayState {
    /// Connected, but no message has named the caller yet.
    AwaitingJoin,
    /// Registered under `name`; every inbound message is broadcast.
    Active { name: String },
    /// Inbound side finished. Nothing more is accepted.
    Closed,
}

/// Drives one bidirectional chat stream.
///
/// The first inbound message registers its sender name with the shared
/// [`ChatRegistry`]. From then on every inbound message, including that first
/// one, is broadcast unchanged to all participants, the sender included. When
/// the caller closes its side, the stream fails or the session is cancelled,
/// the relay unregisters itself and drops its outbound sender so the
/// response stream ends once the registry has let go of it as well.
pub struct ChatRelay {
    registry: Arc<ChatRegistry>,
    session: StreamSession,
    outbound: Option<Outbound>,
    state: RelayState,
}

impl ChatRelay {
    pub fn new(registry: Arc<ChatRegistry>, session: StreamSession, outbound: Outbound) -> Self {
        Self {
            registry,
            session,
            outbound: Some(outbound),
            state: RelayState::AwaitingJoin,
        }
    }

    pub const fn state(&self) -> &RelayState {
        &self.state
    }

    /// Consumes `inbound` until it ends, fails or the session is cancelled.
    ///
    /// Returns the error that terminated the session, if any. Transport
    /// errors are not forwarded to the caller since its connection is already
    /// gone; validation errors are sent as the final item of the response
    /// stream.
    pub async fn run<S>(mut self, mut inbound: S) -> Result<(), Error>
    where
        S: Stream<Item = Result<ChatMessage, Status>> + Unpin,
    {
        let token = self.session.token().clone();

        let result = loop {
            let next = tokio::select! {
                biased;
                () = token.cancelled() => break Err(Error::ServiceShutdown),
                next = inbound.next() => next,
            };

            match next {
                Some(Ok(message)) => {
                    if let Err(e) = self.on_message(message) {
                        break Err(e);
                    }
                }
                Some(Err(status)) => break Err(Error::Transport(status)),
                None => break Ok(()),
            }
        };

        if let Err(e) = &result {
            increment_stream_errors(self.session.kind());
            match e {
                Error::Transport(status) => tracing::warn!(
                    session = self.session.id(),
                    code = ?status.code(),
                    "Chat stream failed: {}",
                    status.message()
                ),
                _ => tracing::info!(session = self.session.id(), "Chat session ended: {e}"),
            }
        }

        self.close(result.as_ref().err());
        result
    }

    /// Handles one inbound message according to the current state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] when the joining message carries no
    /// sender name.
    pub fn on_message(&mut self, message: ChatMessage) -> Result<(), Error> {
        match self.state {
            RelayState::AwaitingJoin => {
                if message.name.trim().is_empty() {
                    return Err(Error::InvalidRequest {
                        reason: "The first chat message must carry a sender name".to_string(),
                    });
                }
                let Some(outbound) = self.outbound.clone() else {
                    return Err(Error::Internal {
                        context: "Chat relay has no outbound stream".to_string(),
                    });
                };

                self.registry
                    .register(message.name.clone(), self.session.id(), outbound);
                self.state = RelayState::Active {
                    name: message.name.clone(),
                };
            }
            RelayState::Active { .. } => {}
            RelayState::Closed => {
                tracing::debug!(session = self.session.id(), "Ignoring message after close");
                return Ok(());
            }
        }

        let delivery = self.registry.broadcast(&message, None);
        tracing::debug!(
            session = self.session.id(),
            sender = %message.name,
            delivered = delivery.delivered,
            failed = delivery.failed,
            "Relayed chat message"
        );
        Ok(())
    }

    /// Unregisters the session and closes its send side.
    fn close(&mut self, error: Option<&Error>) {
        if let RelayState::Active { name } = &self.state {
            self.registry.unregister(name, self.session.id());
        }
        self.state = RelayState::Closed;

        if let Some(outbound) = self.outbound.take() {
            // Only client-facing failures are worth reporting back on the
            // stream; a broken transport cannot carry them anyway.
            if let Some(e @ Error::InvalidRequest { .. }) = error {
                let _ = outbound.try_send(Err(e.clone().into()));
            }
        }

        tracing::info!(session = self.session.id(), "Chat session closed");
    }
}
