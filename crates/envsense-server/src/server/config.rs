use anyhow::bail;
use clap::Parser;
use core::time::Duration;
use envsense_core::types::{AirProfile, FORECAST_INTERVAL, FORECAST_READINGS, ForecastProfile};

/// Runtime configuration for the `envsense-server` binary.
///
/// These settings control where the server listens, how forecast streams are
/// paced, and how much buffering sits between a session task and its gRPC
/// response stream. All values are parsed from CLI arguments or environment
/// variables, with defaults matching the published service behavior.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "envsense-server",
    version,
    about = "A gRPC service for air quality, water quality and customer support chat"
)]
pub struct CliArgs {
    /// Address to listen on (TCP or Unix socket path; use --uds for Unix socket).
    ///
    /// Example: "0.0.0.0:40000" or "/tmp/envsense.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:40000"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be a file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,

    /// Number of readings emitted by each `GetWaterQualityForecast` stream.
    ///
    /// Environment variable: `FORECAST_READINGS`
    #[arg(long, env = "FORECAST_READINGS", default_value_t = FORECAST_READINGS)]
    pub forecast_readings: usize,

    /// Delay between two forecast readings, in milliseconds.
    ///
    /// Environment variable: `FORECAST_INTERVAL_MS`
    #[arg(long, env = "FORECAST_INTERVAL_MS", default_value_t = FORECAST_INTERVAL.as_millis() as u64)]
    pub forecast_interval_ms: u64,

    /// Capacity of the response buffer between a forecast task and its gRPC
    /// stream.
    ///
    /// Environment variable: `STREAM_BUFFER_SIZE`
    #[arg(long, env = "STREAM_BUFFER_SIZE", default_value_t = 8)]
    pub stream_buffer_size: usize,

    /// Capacity of each chat participant's outbound queue.
    ///
    /// A participant whose queue is full misses broadcasts until it catches
    /// up; other participants are unaffected.
    ///
    /// Environment variable: `CHAT_BUFFER_SIZE`
    #[arg(long, env = "CHAT_BUFFER_SIZE", default_value_t = 64)]
    pub chat_buffer_size: usize,

    /// Seconds to wait for in-flight sessions to finish on shutdown before
    /// cancelling them.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 3)]
    pub shutdown_timeout: u64,
}

/// Forecast pacing and the ranges readings are drawn from.
#[derive(Debug, Clone)]
pub struct ForecastConfig {
    pub readings: usize,
    pub interval: Duration,
    pub profile: ForecastProfile,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub uds: bool,
    pub air: AirProfile,
    pub forecast: ForecastConfig,
    pub stream_buffer_size: usize,
    pub chat_buffer_size: usize,
    pub shutdown_timeout: Duration,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.forecast_readings == 0 {
            bail!("FORECAST_READINGS must be greater than 0");
        }

        if args.forecast_interval_ms == 0 {
            bail!("FORECAST_INTERVAL_MS must be greater than 0");
        }

        // `mpsc::channel` panics on a zero capacity.
        if args.stream_buffer_size == 0 {
            bail!("STREAM_BUFFER_SIZE must be greater than 0");
        }

        if args.chat_buffer_size == 0 {
            bail!("CHAT_BUFFER_SIZE must be greater than 0");
        }

        Ok(Self {
            server_addr: args.server_addr,
            uds: args.uds,
            air: AirProfile::default(),
            forecast: ForecastConfig {
                readings: args.forecast_readings,
                interval: Duration::from_millis(args.forecast_interval_ms),
                profile: ForecastProfile::default(),
            },
            stream_buffer_size: args.stream_buffer_size,
            chat_buffer_size: args.chat_buffer_size,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<ServerConfig> {
        let argv = core::iter::once("envsense-server").chain(args.iter().copied());
        ServerConfig::try_from(CliArgs::try_parse_from(argv)?)
    }

    #[test]
    fn defaults_match_service_contract() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.server_addr, "0.0.0.0:40000");
        assert!(!config.uds);
        assert_eq!(config.forecast.readings, 5);
        assert_eq!(config.forecast.interval, Duration::from_secs(2));
        assert_eq!(config.forecast.profile, ForecastProfile::default());
        assert_eq!(config.shutdown_timeout, Duration::from_secs(3));
    }

    #[test]
    fn overrides_forecast_pacing() {
        let config = parse(&["--forecast-readings", "3", "--forecast-interval-ms", "250"]).unwrap();
        assert_eq!(config.forecast.readings, 3);
        assert_eq!(config.forecast.interval, Duration::from_millis(250));
    }

    #[test]
    fn rejects_zero_values() {
        assert!(parse(&["--forecast-readings", "0"]).is_err());
        assert!(parse(&["--forecast-interval-ms", "0"]).is_err());
        assert!(parse(&["--stream-buffer-size", "0"]).is_err());
        assert!(parse(&["--chat-buffer-size", "0"]).is_err());
    }
}
