use crate::server::{
    config::{ForecastConfig, ServerConfig},
    forecast::producer::ForecastProducer,
    session::{SessionKind, SessionTracker},
    upload::aggregator::UploadAggregator,
};
use core::pin::Pin;
use envsense_core::proto::water::{
    ForecastRequest, UploadSummary, WaterQualityForecast, WaterQualitySample,
    water_quality_service_server::WaterQualityService,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::{Stream, wrappers::ReceiverStream};
use tonic::{Request, Response, Status, Streaming};
use tracing::Instrument;

/// Water quality forecasts (server streaming) and sample uploads (client
/// streaming).
#[derive(Clone)]
pub struct WaterService {
    forecast: ForecastConfig,
    stream_buffer_size: usize,
    tracker: Arc<SessionTracker>,
}

impl WaterService {
    pub fn new(config: &ServerConfig, tracker: Arc<SessionTracker>) -> Self {
        Self {
            forecast: config.forecast.clone(),
            stream_buffer_size: config.stream_buffer_size,
            tracker,
        }
    }
}

#[tonic::async_trait]
impl WaterQualityService for WaterService {
    type GetWaterQualityForecastStream =
        Pin<Box<dyn Stream<Item = Result<WaterQualityForecast, Status>> + Send>>;

    /// Streams a fixed number of timed readings, then ends the stream.
    ///
    /// The readings are produced by a spawned task; the handler returns as
    /// soon as the stream is set up. Dropping the response stream stops the
    /// task before its next reading.
    #[tracing::instrument(skip_all)]
    async fn get_water_quality_forecast(
        &self,
        _req: Request<ForecastRequest>,
    ) -> Result<Response<Self::GetWaterQualityForecastStream>, Status> {
        let session = self.tracker.open(SessionKind::Forecast)?;
        let span = tracing::info_span!("forecast", session = session.id());

        let (resp_tx, resp_rx) = mpsc::channel(self.stream_buffer_size);
        let producer = ForecastProducer::new(self.forecast.clone(), session);

        tokio::spawn(
            async move {
                let outcome = producer.run(resp_tx).await;
                tracing::debug!(emitted = outcome.emitted(), ?outcome, "Forecast task finished");
            }
            .instrument(span),
        );

        Ok(Response::new(Box::pin(ReceiverStream::new(resp_rx))))
    }

    /// Collects every uploaded sample and replies once the caller finishes.
    #[tracing::instrument(skip_all)]
    async fn upload_water_quality_sample(
        &self,
        req: Request<Streaming<WaterQualitySample>>,
    ) -> Result<Response<UploadSummary>, Status> {
        let session = self.tracker.open(SessionKind::Upload)?;
        let span = tracing::info_span!("upload", session = session.id());

        let summary = UploadAggregator::new()
            .consume(&session, req.into_inner())
            .instrument(span)
            .await?;

        Ok(Response::new(summary))
    }
}
