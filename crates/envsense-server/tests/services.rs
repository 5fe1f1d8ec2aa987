use clap::Parser;
use core::time::Duration;
use envsense_core::{
    proto::{
        air::{
            AirQualityRequest, air_quality_service_client::AirQualityServiceClient,
            air_quality_service_server::AirQualityServiceServer,
        },
        support::{
            ChatMessage, customer_support_service_client::CustomerSupportServiceClient,
            customer_support_service_server::CustomerSupportServiceServer,
        },
        water::{
            ForecastRequest, WaterQualitySample,
            water_quality_service_client::WaterQualityServiceClient,
            water_quality_service_server::WaterQualityServiceServer,
        },
    },
    quality::{AirQuality, WaterQuality},
    types::DISTRICTS,
};
use envsense_server::server::{
    config::{CliArgs, ServerConfig},
    service::Services,
};
use tokio::{net::TcpListener, sync::mpsc};
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tonic::{
    Code,
    transport::{Channel, Server},
};

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

fn config(extra: &[&str]) -> ServerConfig {
    let args = ["envsense-server", "--forecast-interval-ms", "20"]
        .into_iter()
        .chain(extra.iter().copied());
    ServerConfig::try_from(CliArgs::try_parse_from(args).unwrap()).unwrap()
}

async fn spawn_server(config: ServerConfig) -> (Channel, Services) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let services = Services::new(&config);

    let router = Server::builder()
        .add_service(AirQualityServiceServer::new(services.air.clone()))
        .add_service(WaterQualityServiceServer::new(services.water.clone()))
        .add_service(CustomerSupportServiceServer::new(services.support.clone()));
    tokio::spawn(router.serve_with_incoming(TcpListenerStream::new(listener)));

    let channel = Channel::from_shared(format!("http://{addr}"))
        .unwrap()
        .connect()
        .await
        .unwrap();
    (channel, services)
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(TEST_TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn chat(name: &str, message: &str) -> ChatMessage {
    ChatMessage {
        name: name.to_string(),
        message: message.to_string(),
    }
}

#[tokio::test]
async fn air_quality_for_every_district() {
    let (channel, _services) = spawn_server(config(&[])).await;
    let mut client = AirQualityServiceClient::new(channel);

    for district in DISTRICTS {
        let reading = client
            .get_air_quality(AirQualityRequest { district })
            .await
            .unwrap()
            .into_inner();

        assert!((300.0..=500.0).contains(&reading.co2_level));
        assert_eq!(
            reading.air_quality,
            AirQuality::from_co2(reading.co2_level).as_str()
        );
    }
}

#[tokio::test]
async fn air_quality_rejects_unknown_district() {
    let (channel, _services) = spawn_server(config(&[])).await;
    let mut client = AirQualityServiceClient::new(channel);

    for district in [0, 25] {
        let status = client
            .get_air_quality(AirQualityRequest { district })
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);
    }
}

#[tokio::test]
async fn forecast_streams_five_readings_then_ends() {
    let (channel, services) = spawn_server(config(&[])).await;
    let mut client = WaterQualityServiceClient::new(channel);

    let mut stream = client
        .get_water_quality_forecast(ForecastRequest {})
        .await
        .unwrap()
        .into_inner();

    let mut readings = Vec::new();
    while let Some(reading) = stream.message().await.unwrap() {
        assert_eq!(
            reading.water_quality,
            WaterQuality::from_ph(reading.ph_level).as_str()
        );
        readings.push(reading);
    }

    assert_eq!(readings.len(), 5);
    wait_until(|| services.tracker().inflight() == 0).await;
}

#[tokio::test]
async fn forecast_stops_when_client_goes_away() {
    let (channel, services) = spawn_server(config(&["--forecast-readings", "1000"])).await;
    let mut client = WaterQualityServiceClient::new(channel);

    let mut stream = client
        .get_water_quality_forecast(ForecastRequest {})
        .await
        .unwrap()
        .into_inner();
    stream.message().await.unwrap().unwrap();
    assert_eq!(services.tracker().inflight(), 1);

    drop(stream);

    wait_until(|| services.tracker().inflight() == 0).await;
}

#[tokio::test]
async fn upload_reports_sample_count() {
    let (channel, _services) = spawn_server(config(&[])).await;
    let mut client = WaterQualityServiceClient::new(channel);

    let samples = vec![
        WaterQualitySample {
            ph_level: 7.1,
            temperature: 15.0,
            dissolved_oxygen: 8.0,
        };
        3
    ];
    let summary = client
        .upload_water_quality_sample(tokio_stream::iter(samples))
        .await
        .unwrap()
        .into_inner();

    assert_eq!(summary.sample_count, 3);
    assert_eq!(summary.water_quality, "Good");
}

#[tokio::test]
async fn empty_upload_reports_zero_samples() {
    let (channel, _services) = spawn_server(config(&[])).await;
    let mut client = WaterQualityServiceClient::new(channel);

    let summary = client
        .upload_water_quality_sample(tokio_stream::iter(Vec::<WaterQualitySample>::new()))
        .await
        .unwrap()
        .into_inner();

    assert_eq!(summary.sample_count, 0);
}

#[tokio::test]
async fn chat_relays_between_participants() {
    let (channel, services) = spawn_server(config(&[])).await;
    let registry = services.support.registry();

    let (alice, alice_rx) = mpsc::channel(8);
    alice.send(chat("Alice", "Alice joined the chat.")).await.unwrap();
    let mut alice_stream = CustomerSupportServiceClient::new(channel.clone())
        .contact_customer_support(ReceiverStream::new(alice_rx))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(alice_stream.message().await.unwrap().unwrap().name, "Alice");

    let (bob, bob_rx) = mpsc::channel(8);
    bob.send(chat("Bob", "Bob joined the chat.")).await.unwrap();
    let mut bob_stream = CustomerSupportServiceClient::new(channel)
        .contact_customer_support(ReceiverStream::new(bob_rx))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(bob_stream.message().await.unwrap().unwrap().name, "Bob");
    assert_eq!(
        alice_stream.message().await.unwrap().unwrap().message,
        "Bob joined the chat."
    );
    assert_eq!(registry.len(), 2);

    alice.send(chat("Alice", "Hi Bob")).await.unwrap();
    assert_eq!(
        bob_stream.message().await.unwrap().unwrap(),
        chat("Alice", "Hi Bob")
    );
    assert_eq!(alice_stream.message().await.unwrap().unwrap().message, "Hi Bob");

    bob.send(chat("Bob", "Bob left the chatroom.")).await.unwrap();
    drop(bob);
    assert_eq!(
        bob_stream.message().await.unwrap().unwrap().message,
        "Bob left the chatroom."
    );
    assert!(bob_stream.message().await.unwrap().is_none());
    assert_eq!(registry.len(), 1);
    assert!(registry.contains("Alice"));

    assert_eq!(
        alice_stream.message().await.unwrap().unwrap().message,
        "Bob left the chatroom."
    );
    alice.send(chat("Alice", "anyone?")).await.unwrap();
    assert_eq!(alice_stream.message().await.unwrap().unwrap().message, "anyone?");
}

#[tokio::test]
async fn chat_rejects_nameless_join() {
    let (channel, services) = spawn_server(config(&[])).await;

    let (caller, caller_rx) = mpsc::channel(8);
    caller.send(chat("", "hello?")).await.unwrap();
    let mut stream = CustomerSupportServiceClient::new(channel)
        .contact_customer_support(ReceiverStream::new(caller_rx))
        .await
        .unwrap()
        .into_inner();

    let status = stream.message().await.unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);
    assert!(services.support.registry().is_empty());
}

#[tokio::test]
async fn shutdown_refuses_new_streams() {
    let (channel, services) = spawn_server(config(&["--shutdown-timeout", "0"])).await;
    services.shutdown().await;

    let status = WaterQualityServiceClient::new(channel)
        .get_water_quality_forecast(ForecastRequest {})
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unavailable);
}
