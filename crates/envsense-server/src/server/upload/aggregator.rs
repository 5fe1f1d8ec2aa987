use crate::server::{
    session::StreamSession,
    telemetry::{increment_samples_received, increment_stream_errors},
};
use envsense_core::{
    Error,
    proto::water::{UploadSummary, WaterQualitySample},
    quality::WaterQuality,
};
use futures::{Stream, StreamExt};
use tonic::Status;

/// Collects the samples of one upload stream and summarizes them.
///
/// The sample sequence is append-only and owned by this aggregator alone.
/// Nothing is replied until the caller ends its stream.
#[derive(Debug, Default)]
pub struct UploadAggregator {
    samples: Vec<WaterQualitySample>,
}

impl UploadAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a sample and returns its 1-based position.
    pub fn push(&mut self, sample: WaterQualitySample) -> usize {
        self.samples.push(sample);
        self.samples.len()
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }

    /// Builds the reply for everything received so far.
    ///
    /// An empty upload is still a valid upload: the count is zero, means are
    /// zero and no quality label is assigned.
    pub fn summary(&self) -> UploadSummary {
        let count = self.samples.len();
        if count == 0 {
            return UploadSummary {
                sample_count: 0,
                analysis_result: "No water quality samples were received.".to_string(),
                ..UploadSummary::default()
            };
        }

        let n = count as f64;
        let mean = |field: fn(&WaterQualitySample) -> f64| {
            self.samples.iter().map(field).sum::<f64>() / n
        };
        let mean_ph_level = mean(|s| s.ph_level);
        let quality = WaterQuality::from_ph(mean_ph_level);

        UploadSummary {
            sample_count: u32::try_from(count).unwrap_or(u32::MAX),
            analysis_result: format!(
                "Received {count} water quality sample{}. Average pH {mean_ph_level:.2} indicates {} water quality.",
                if count == 1 { "" } else { "s" },
                quality.as_str().to_lowercase(),
            ),
            mean_ph_level,
            mean_temperature: mean(|s| s.temperature),
            mean_dissolved_oxygen: mean(|s| s.dissolved_oxygen),
            water_quality: quality.to_string(),
        }
    }

    /// Drains `inbound` and returns the summary once the caller ends it.
    ///
    /// # Errors
    ///
    /// - [`Error::Transport`] if the stream fails mid-upload; no partial
    ///   summary is produced.
    /// - [`Error::ServiceShutdown`] if the session is cancelled first.
    pub async fn consume<S>(
        mut self,
        session: &StreamSession,
        mut inbound: S,
    ) -> Result<UploadSummary, Error>
    where
        S: Stream<Item = Result<WaterQualitySample, Status>> + Unpin,
    {
        let token = session.token();

        let result = loop {
            let next = tokio::select! {
                biased;
                () = token.cancelled() => break Err(Error::ServiceShutdown),
                next = inbound.next() => next,
            };

            match next {
                Some(Ok(sample)) => {
                    let position = self.push(sample);
                    increment_samples_received();
                    tracing::debug!(
                        session = session.id(),
                        position,
                        "Received water quality sample"
                    );
                }
                Some(Err(status)) => break Err(Error::Transport(status)),
                None => break Ok(self.summary()),
            }
        };

        match &result {
            Ok(summary) => tracing::info!(
                session = session.id(),
                samples = summary.sample_count,
                "Upload stream completed"
            ),
            Err(e) => {
                increment_stream_errors(session.kind());
                tracing::warn!(
                    session = session.id(),
                    samples = self.count(),
                    "Upload stream aborted: {e}"
                );
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::session::{SessionKind, SessionTracker};
    use core::time::Duration;
    use futures::stream;
    use std::sync::Arc;

    fn sample(ph_level: f64, temperature: f64, dissolved_oxygen: f64) -> WaterQualitySample {
        WaterQualitySample {
            ph_level,
            temperature,
            dissolved_oxygen,
        }
    }

    fn session() -> StreamSession {
        Arc::new(SessionTracker::new(Duration::from_millis(10)))
            .open(SessionKind::Upload)
            .unwrap()
    }

    #[tokio::test]
    async fn summarizes_three_samples() {
        let session = session();
        let inbound = stream::iter(vec![
            Ok(sample(6.0, 10.0, 5.0)),
            Ok(sample(7.0, 12.0, 7.0)),
            Ok(sample(8.0, 14.0, 9.0)),
        ]);

        let summary = UploadAggregator::new()
            .consume(&session, inbound)
            .await
            .unwrap();

        assert_eq!(summary.sample_count, 3);
        assert_eq!(summary.mean_ph_level, 7.0);
        assert_eq!(summary.mean_temperature, 12.0);
        assert_eq!(summary.mean_dissolved_oxygen, 7.0);
        assert_eq!(summary.water_quality, "Good");
        assert!(summary.analysis_result.starts_with("Received 3 water quality samples."));
    }

    #[tokio::test]
    async fn empty_upload_still_gets_a_summary() {
        let session = session();
        let inbound = stream::iter(Vec::<Result<WaterQualitySample, Status>>::new());

        let summary = UploadAggregator::new()
            .consume(&session, inbound)
            .await
            .unwrap();

        assert_eq!(summary.sample_count, 0);
        assert_eq!(summary.mean_ph_level, 0.0);
        assert!(summary.water_quality.is_empty());
    }

    #[tokio::test]
    async fn transport_error_discards_partial_summary() {
        let session = session();
        let inbound = stream::iter(vec![
            Ok(sample(7.0, 12.0, 7.0)),
            Err(Status::unknown("connection reset")),
            Ok(sample(7.0, 12.0, 7.0)),
        ]);

        let err = UploadAggregator::new()
            .consume(&session, inbound)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Transport(ref status) if status.code() == tonic::Code::Unknown));
    }

    #[tokio::test]
    async fn never_replies_before_end_of_stream() {
        let session = session();
        let (tx, rx) = tokio::sync::mpsc::channel(4);
        let inbound = tokio_stream::wrappers::ReceiverStream::new(rx);

        let mut upload = Box::pin(UploadAggregator::new().consume(&session, inbound));
        tx.send(Ok(sample(7.0, 12.0, 7.0))).await.unwrap();

        let pending = tokio::time::timeout(Duration::from_millis(20), &mut upload).await;
        assert!(pending.is_err(), "summary must wait for the caller to finish");

        drop(tx);
        assert_eq!(upload.await.unwrap().sample_count, 1);
    }

    #[tokio::test]
    async fn cancelled_session_aborts_upload() {
        let session = session();
        session.cancel();

        let err = UploadAggregator::new()
            .consume(&session, stream::pending::<Result<WaterQualitySample, Status>>())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ServiceShutdown));
    }

    #[test]
    fn counts_samples_as_they_arrive() {
        let mut aggregator = UploadAggregator::new();
        assert_eq!(aggregator.push(sample(6.1, 10.0, 5.0)), 1);
        assert_eq!(aggregator.push(sample(7.2, 11.0, 6.0)), 2);

        assert_eq!(aggregator.count(), 2);
        assert!((aggregator.summary().mean_ph_level - 6.65).abs() < 1e-9);
        assert!(aggregator.summary().analysis_result.contains("2 water quality samples"));
    }
}
