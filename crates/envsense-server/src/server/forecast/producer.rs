use crate::server::{
    config::ForecastConfig,
    readings::forecast_reading,
    session::StreamSession,
    telemetry::increment_readings_emitted,
};
use envsense_core::proto::water::WaterQualityForecast;
use tokio::{
    sync::mpsc,
    time::{Instant, MissedTickBehavior, interval_at},
};
use tonic::Status;

/// How a forecast stream finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ForecastOutcome {
    /// All readings were sent and the stream was closed normally.
    Completed { emitted: usize },
    /// The caller stopped listening before the last reading.
    Cancelled { emitted: usize },
    /// The service shut down before the last reading.
    Shutdown { emitted: usize },
}

impl ForecastOutcome {
    pub const fn emitted(self) -> usize {
        match self {
            Self::Completed { emitted }
            | Self::Cancelled { emitted }
            | Self::Shutdown { emitted } => emitted,
        }
    }
}

/// Emits a fixed number of timed forecast readings on one stream.
///
/// The first reading is sent one interval after the stream opens, mirroring a
/// periodic timer. Before every emission the producer checks whether the
/// session was cancelled or the caller dropped its receiver; either stops the
/// timer immediately without an error. Shutdown is honoured even while the
/// producer waits for buffer space.
pub struct ForecastProducer {
    config: ForecastConfig,
    session: StreamSession,
}

impl ForecastProducer {
    pub const fn new(config: ForecastConfig, session: StreamSession) -> Self {
        Self { config, session }
    }

    /// Runs the producer to completion, consuming it.
    ///
    /// Dropping `resp_tx` on return closes the response stream.
    pub async fn run(
        self,
        resp_tx: mpsc::Sender<Result<WaterQualityForecast, Status>>,
    ) -> ForecastOutcome {
        let period = self.config.interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let token = self.session.token();
        let mut emitted = 0;

        let outcome = loop {
            if emitted == self.config.readings {
                break ForecastOutcome::Completed { emitted };
            }

            tokio::select! {
                biased;
                () = token.cancelled() => break ForecastOutcome::Shutdown { emitted },
                () = resp_tx.closed() => break ForecastOutcome::Cancelled { emitted },
                _ = ticker.tick() => {}
            }

            // The tick may have raced with a cancellation.
            if token.is_cancelled() {
                break ForecastOutcome::Shutdown { emitted };
            }

            // A caller that stops reading fills the buffer; waiting for room
            // must still yield to shutdown.
            let permit = tokio::select! {
                biased;
                () = token.cancelled() => break ForecastOutcome::Shutdown { emitted },
                permit = resp_tx.reserve() => permit,
            };
            let Ok(permit) = permit else {
                break ForecastOutcome::Cancelled { emitted };
            };

            permit.send(Ok(forecast_reading(&self.config.profile)));
            emitted += 1;
            increment_readings_emitted();
        };

        let session = self.session.id();
        match outcome {
            ForecastOutcome::Completed { .. } => {
                tracing::info!(session, emitted, "Forecast stream completed");
            }
            ForecastOutcome::Cancelled { .. } => {
                tracing::info!(session, emitted, "Forecast stream cancelled by client");
            }
            ForecastOutcome::Shutdown { .. } => {
                tracing::info!(session, emitted, "Forecast stream stopped by shutdown");
                // Best effort: the caller may already be gone.
                let _ = resp_tx.try_send(Err(Status::unavailable("Service is shutting down")));
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::session::{SessionKind, SessionTracker};
    use core::time::Duration;
    use envsense_core::{quality::WaterQuality, types::ForecastProfile};
    use std::sync::Arc;

    fn config(readings: usize) -> ForecastConfig {
        ForecastConfig {
            readings,
            interval: Duration::from_secs(2),
            profile: ForecastProfile::default(),
        }
    }

    fn tracker() -> Arc<SessionTracker> {
        Arc::new(SessionTracker::new(Duration::from_secs(1)))
    }

    #[tokio::test(start_paused = true)]
    async fn emits_configured_readings_then_closes() {
        let tracker = tracker();
        let session = tracker.open(SessionKind::Forecast).unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        let start = Instant::now();

        let handle = tokio::spawn(ForecastProducer::new(config(5), session).run(tx));

        let mut readings = Vec::new();
        while let Some(reading) = rx.recv().await {
            readings.push(reading.unwrap());
        }

        assert_eq!(readings.len(), 5);
        for reading in &readings {
            assert!((6.0..=8.0).contains(&reading.ph_level));
            assert_eq!(
                reading.water_quality,
                WaterQuality::from_ph(reading.ph_level).as_str()
            );
        }
        assert_eq!(handle.await.unwrap(), ForecastOutcome::Completed { emitted: 5 });
        // Five readings, one interval apart, the first after one interval.
        assert!(start.elapsed() >= Duration::from_secs(10));
        assert_eq!(tracker.inflight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn readings_are_spaced_by_the_interval() {
        let tracker = tracker();
        let session = tracker.open(SessionKind::Forecast).unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        tokio::spawn(ForecastProducer::new(config(3), session).run(tx));

        let mut last = Instant::now();
        while let Some(reading) = rx.recv().await {
            reading.unwrap();
            let now = Instant::now();
            assert!(now - last >= Duration::from_secs(2));
            last = now;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_receiver_stops_emission() {
        let tracker = tracker();
        let session = tracker.open(SessionKind::Forecast).unwrap();
        let (tx, mut rx) = mpsc::channel(8);

        let handle = tokio::spawn(ForecastProducer::new(config(5), session).run(tx));

        rx.recv().await.unwrap().unwrap();
        rx.recv().await.unwrap().unwrap();
        drop(rx);

        assert_eq!(handle.await.unwrap(), ForecastOutcome::Cancelled { emitted: 2 });
        assert_eq!(tracker.inflight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_releases_producer_blocked_on_full_buffer() {
        let tracker = Arc::new(SessionTracker::new(Duration::ZERO));
        let session = tracker.open(SessionKind::Forecast).unwrap();
        // Room for one reading; the caller never reads.
        let (tx, _rx) = mpsc::channel(1);
        let config = ForecastConfig {
            readings: 10,
            interval: Duration::from_millis(10),
            profile: ForecastProfile::default(),
        };

        let handle = tokio::spawn(ForecastProducer::new(config, session).run(tx));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!handle.is_finished());

        tracker.shutdown().await;

        let outcome = tokio::time::timeout(Duration::from_secs(60), handle)
            .await
            .expect("producer ignored shutdown")
            .unwrap();
        assert_eq!(outcome, ForecastOutcome::Shutdown { emitted: 1 });
        assert_eq!(tracker.inflight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_emission_with_unavailable() {
        let tracker = Arc::new(SessionTracker::new(Duration::ZERO));
        let session = tracker.open(SessionKind::Forecast).unwrap();
        let (tx, mut rx) = mpsc::channel(8);

        let handle = tokio::spawn(ForecastProducer::new(config(5), session).run(tx));

        rx.recv().await.unwrap().unwrap();
        tracker.shutdown().await;

        assert_eq!(handle.await.unwrap(), ForecastOutcome::Shutdown { emitted: 1 });
        let status = rx.recv().await.unwrap().unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unavailable);
        assert!(rx.recv().await.is_none());
    }
}
