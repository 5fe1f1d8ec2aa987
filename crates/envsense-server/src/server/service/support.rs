use crate::server::{
    chat::{registry::ChatRegistry, relay::ChatRelay},
    session::{SessionKind, SessionTracker},
};
use core::pin::Pin;
use envsense_core::proto::support::{
    ChatMessage, customer_support_service_server::CustomerSupportService,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::{Stream, wrappers::ReceiverStream};
use tonic::{Request, Response, Status, Streaming};
use tracing::Instrument;

/// Customer support chat. Every connected participant shares one
/// [`ChatRegistry`].
#[derive(Clone)]
pub struct SupportService {
    registry: Arc<ChatRegistry>,
    tracker: Arc<SessionTracker>,
    chat_buffer_size: usize,
}

impl SupportService {
    pub const fn new(
        registry: Arc<ChatRegistry>,
        tracker: Arc<SessionTracker>,
        chat_buffer_size: usize,
    ) -> Self {
        Self {
            registry,
            tracker,
            chat_buffer_size,
        }
    }

    pub const fn registry(&self) -> &Arc<ChatRegistry> {
        &self.registry
    }
}

#[tonic::async_trait]
impl CustomerSupportService for SupportService {
    type ContactCustomerSupportStream =
        Pin<Box<dyn Stream<Item = Result<ChatMessage, Status>> + Send>>;

    #[tracing::instrument(skip_all)]
    async fn contact_customer_support(
        &self,
        req: Request<Streaming<ChatMessage>>,
    ) -> Result<Response<Self::ContactCustomerSupportStream>, Status> {
        let session = self.tracker.open(SessionKind::Chat)?;
        let span = tracing::info_span!("chat", session = session.id());

        let (outbound, outbound_rx) = mpsc::channel(self.chat_buffer_size);
        let relay = ChatRelay::new(Arc::clone(&self.registry), session, outbound);
        let inbound = req.into_inner();

        tokio::spawn(
            async move {
                // Failures are already logged and reported by the relay.
                let _ = relay.run(inbound).await;
            }
            .instrument(span),
        );

        Ok(Response::new(Box::pin(ReceiverStream::new(outbound_rx))))
    }
}
