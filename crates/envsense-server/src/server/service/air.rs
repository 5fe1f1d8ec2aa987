use crate::server::readings::air_reading;
use envsense_core::{
    Error,
    proto::air::{AirQualityRequest, AirQualityResponse, air_quality_service_server::AirQualityService},
    types::{AirProfile, DISTRICTS},
};
use tonic::{Request, Response, Status};

/// Unary air quality lookups. Stateless apart from its sampling profile.
#[derive(Clone)]
pub struct AirService {
    profile: AirProfile,
}

impl AirService {
    pub const fn new(profile: AirProfile) -> Self {
        Self { profile }
    }
}

#[tonic::async_trait]
impl AirQualityService for AirService {
    #[tracing::instrument(skip_all, fields(district = req.get_ref().district))]
    async fn get_air_quality(
        &self,
        req: Request<AirQualityRequest>,
    ) -> Result<Response<AirQualityResponse>, Status> {
        let district = req.get_ref().district;

        if !DISTRICTS.contains(&district) {
            return Err(Error::InvalidRequest {
                reason: format!(
                    "District {district} does not exist (expected {}-{})",
                    DISTRICTS.start(),
                    DISTRICTS.end()
                ),
            }
            .into());
        }

        let reading = air_reading(&self.profile);
        tracing::info!(
            co2_level = reading.co2_level,
            air_quality = %reading.air_quality,
            "Served air quality reading"
        );

        Ok(Response::new(reading))
    }
}
