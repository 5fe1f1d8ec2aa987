//! gRPC service implementations.
//!
//! Each handler validates its request, opens a [`StreamSession`] for
//! streaming calls and hands the stream to the matching session driver in a
//! spawned task. Handlers never block on session work.
//!
//! ## Structure
//!
//! - [`air`] - Unary `AirQualityService`.
//! - [`water`] - Forecast and upload on `WaterQualityService`.
//! - [`support`] - Chat relay on `CustomerSupportService`.
//!
//! [`StreamSession`]: crate::server::session::StreamSession

pub mod air;
pub mod support;
pub mod water;

use crate::server::{chat::registry::ChatRegistry, config::ServerConfig, session::SessionTracker};
use std::sync::Arc;

/// Every service of the server, sharing one session tracker and one chat
/// registry.
#[derive(Clone)]
pub struct Services {
    pub air: air::AirService,
    pub water: water::WaterService,
    pub support: support::SupportService,
    tracker: Arc<SessionTracker>,
}

impl Services {
    pub fn new(config: &ServerConfig) -> Self {
        let tracker = Arc::new(SessionTracker::new(config.shutdown_timeout));
        let registry = Arc::new(ChatRegistry::new());

        Self {
            air: air::AirService::new(config.air.clone()),
            water: water::WaterService::new(config, Arc::clone(&tracker)),
            support: support::SupportService::new(
                registry,
                Arc::clone(&tracker),
                config.chat_buffer_size,
            ),
            tracker,
        }
    }

    pub fn tracker(&self) -> &Arc<SessionTracker> {
        &self.tracker
    }

    /// Refuses new sessions, drains in-flight ones and cancels the rest.
    pub async fn shutdown(&self) {
        self.tracker.shutdown().await;
    }
}
