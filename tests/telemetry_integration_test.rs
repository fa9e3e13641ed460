mod common;

use std::fs;
use std::time::Duration;

use common::json_ietf_update;
use common::path;
use common::subscribe;
use common::test_config;
use common::update_names;
use common::TestServer;
use common::HangingStore;
use common::BUILD_VERSION;
use gnmi_telemetry::generate_self_signed_certificates;
use gnmi_telemetry::proto;
use gnmi_telemetry::proto::g_nmi_client::GNmiClient;
use gnmi_telemetry::proto::subscribe_response::Response;
use gnmi_telemetry::proto::subscription_list::Mode;
use gnmi_telemetry::proto::Encoding;
use gnmi_telemetry::proto::SubscriptionMode;
use tempfile::tempdir;
use tokio::time::timeout;
use tokio::time::Instant;
use tonic::transport::Certificate;
use tonic::transport::Channel;
use tonic::transport::ClientTlsConfig;
use tonic::transport::Identity;
use tonic::Code;
use tonic::Streaming;

const SECOND_NS: u64 = 1_000_000_000;

fn get_request(
    target: &str,
    elems: &[&str],
) -> proto::GetRequest {
    proto::GetRequest {
        prefix: Some(path(target, &[])),
        path: vec![path("", elems)],
        encoding: Encoding::JsonIetf as i32,
    }
}

fn subscription_list(
    mode: Mode,
    subscriptions: Vec<proto::Subscription>,
    update_count: u64,
) -> proto::SubscriptionList {
    proto::SubscriptionList {
        prefix: Some(path("COUNTERS_DB", &[])),
        subscription: subscriptions,
        mode: mode as i32,
        encoding: Encoding::JsonIetf as i32,
        update_count,
    }
}

fn sample(
    elems: &[&str],
    sample_interval: u64,
) -> proto::Subscription {
    proto::Subscription {
        path: Some(path("", elems)),
        mode: SubscriptionMode::Sample as i32,
        sample_interval,
    }
}

fn on_change(elems: &[&str]) -> proto::Subscription {
    proto::Subscription {
        path: Some(path("", elems)),
        mode: SubscriptionMode::OnChange as i32,
        sample_interval: 0,
    }
}

/// Every response until the server ends the stream
async fn collect(mut stream: Streaming<proto::SubscribeResponse>) -> Vec<Response> {
    let mut responses = Vec::new();
    let drained = timeout(Duration::from_secs(10), async {
        while let Some(message) = stream.message().await.unwrap() {
            responses.push(message.response.unwrap());
        }
    })
    .await;
    assert!(drained.is_ok(), "stream did not end, got {:?}", responses);
    responses
}

async fn next_response(stream: &mut Streaming<proto::SubscribeResponse>) -> Response {
    timeout(Duration::from_secs(5), stream.message())
        .await
        .unwrap()
        .unwrap()
        .unwrap()
        .response
        .unwrap()
}

#[tokio::test]
async fn test_get_port_counters_through_name_map() {
    let server = TestServer::start(test_config()).await;
    let mut client = server.client().await;

    let response = client
        .get(get_request("COUNTERS_DB", &["COUNTERS", "Ethernet0"]))
        .await
        .unwrap()
        .into_inner();

    assert_eq!(response.notification.len(), 1);
    let notification = &response.notification[0];
    assert!(notification.timestamp > 0);
    assert_eq!(notification.prefix.as_ref().unwrap().target, "COUNTERS_DB");
    assert_eq!(update_names(&notification.update[0]), vec!["COUNTERS", "Ethernet0"]);

    let value = json_ietf_update(&notification.update[0]);
    assert_eq!(value["SAI_PORT_STAT_IF_IN_OCTETS"], "1000");
    assert_eq!(value["SAI_PORT_STAT_IF_IN_ERRORS"], "0");
}

#[tokio::test]
async fn test_get_os_version_build() {
    let server = TestServer::start(test_config()).await;
    let mut client = server.client().await;

    let response = client
        .get(get_request("OTHERS", &["osversion", "build"]))
        .await
        .unwrap()
        .into_inner();

    let update = &response.notification[0].update[0];
    let Some(proto::typed_value::Value::JsonIetfVal(bytes)) = update.val.as_ref().and_then(|v| v.value.clone())
    else {
        panic!("expected json_ietf_val");
    };
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.contains(&format!("\"build_version\": \"{}\"", BUILD_VERSION)), "{}", text);
}

#[tokio::test]
async fn test_get_errors_map_to_status_codes() {
    let server = TestServer::start(test_config()).await;
    let mut client = server.client().await;

    let status = client
        .get(get_request("NO_SUCH_DB", &["COUNTERS"]))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);

    let status = client
        .get(get_request("APPL_DB", &["PORT_TABLE", "Ethernet99"]))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::NotFound);
}

#[tokio::test]
async fn test_sample_subscription_stops_at_update_count() {
    let server = TestServer::start(test_config()).await;
    let mut client = server.client().await;

    let list = subscription_list(
        Mode::Stream,
        vec![sample(&["COUNTERS", "Ethernet0"], SECOND_NS / 10)],
        3,
    );
    let (_keep_open, stream) = subscribe(&mut client, list).await.unwrap();
    let responses = collect(stream).await;

    let updates: Vec<&proto::Notification> = responses
        .iter()
        .filter_map(|r| match r {
            Response::Update(n) => Some(n),
            _ => None,
        })
        .collect();
    assert_eq!(updates.len(), 3);
    for notification in &updates {
        assert!(notification.timestamp > 0);
        assert_eq!(update_names(&notification.update[0]), vec!["COUNTERS", "Ethernet0"]);
    }
    assert!(updates.windows(2).all(|w| w[0].timestamp < w[1].timestamp));

    assert!(matches!(responses[1], Response::SyncResponse(true)));
    assert_eq!(
        responses.last(),
        Some(&Response::Closed(proto::SessionClosed {
            reason: "Max update count reached 3".into(),
            updates_sent: 3,
        }))
    );
}

#[tokio::test]
async fn test_once_subscription_ends_after_sync() {
    let server = TestServer::start(test_config()).await;
    let mut client = server.client().await;

    let mut list = subscription_list(Mode::Once, vec![on_change(&["PORT_TABLE", "Ethernet0", "oper_status"])], 0);
    list.prefix = Some(path("APPL_DB", &[]));

    let (_keep_open, stream) = subscribe(&mut client, list).await.unwrap();
    let responses = collect(stream).await;

    assert_eq!(responses.len(), 2, "{:?}", responses);
    let Response::Update(notification) = &responses[0] else {
        panic!("expected update, got {:?}", responses[0]);
    };
    assert_eq!(
        notification.update[0].val.as_ref().unwrap().value,
        Some(proto::typed_value::Value::StringVal("up".into()))
    );
    assert!(matches!(responses[1], Response::SyncResponse(true)));
}

#[tokio::test]
async fn test_poll_subscription_answers_each_poll() {
    let server = TestServer::start(test_config()).await;
    let mut client = server.client().await;

    let list = subscription_list(Mode::Poll, vec![on_change(&["COUNTERS", "Ethernet0"])], 0);
    let (tx, mut stream) = subscribe(&mut client, list).await.unwrap();

    // initial snapshot
    assert!(matches!(next_response(&mut stream).await, Response::Update(_)));
    assert!(matches!(next_response(&mut stream).await, Response::SyncResponse(true)));

    for _ in 0..2 {
        tx.send(proto::SubscribeRequest {
            request: Some(proto::subscribe_request::Request::Poll(proto::Poll {})),
        })
        .await
        .unwrap();
        assert!(matches!(next_response(&mut stream).await, Response::Update(_)));
        assert!(matches!(next_response(&mut stream).await, Response::SyncResponse(true)));
    }

    // half-closing ends a POLL session
    drop(tx);
    let rest = collect(stream).await;
    assert!(rest.is_empty(), "{:?}", rest);
}

#[tokio::test]
async fn test_json_subscription_gets_json_val() {
    let server = TestServer::start(test_config()).await;
    let mut client = server.client().await;

    let mut list = subscription_list(Mode::Once, vec![on_change(&["COUNTERS", "Ethernet0"])], 0);
    list.encoding = Encoding::Json as i32;

    let (_keep_open, stream) = subscribe(&mut client, list).await.unwrap();
    let responses = collect(stream).await;

    let Response::Update(notification) = &responses[0] else {
        panic!("expected update, got {:?}", responses[0]);
    };
    let Some(proto::typed_value::Value::JsonVal(bytes)) = notification.update[0].val.as_ref().and_then(|v| v.value.clone())
    else {
        panic!("expected json_val, got {:?}", notification.update[0].val);
    };
    let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(value["SAI_PORT_STAT_IF_IN_OCTETS"], "1000");
}

#[tokio::test]
async fn test_get_timeout_bounds_path_resolution() {
    let mut config = test_config();
    config.server.get_timeout_ms = 100;
    let server = TestServer::start_with_store(config, HangingStore::handle()).await;
    let mut client = server.client().await;

    // the name map lookup alone would outlast the budget
    let started = Instant::now();
    let status = client
        .get(get_request("COUNTERS_DB", &["COUNTERS", "Ethernet0"]))
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::Unavailable);
    assert!(status.message().contains("timed out"), "{}", status.message());
    assert!(started.elapsed() < Duration::from_millis(600), "took {:?}", started.elapsed());
}

#[tokio::test]
async fn test_zero_sample_interval_is_invalid_argument() {
    let server = TestServer::start(test_config()).await;
    let mut client = server.client().await;

    let list = subscription_list(Mode::Stream, vec![sample(&["COUNTERS", "Ethernet0"], 0)], 0);
    let status = subscribe(&mut client, list).await.unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn test_capabilities_list_targets() {
    let server = TestServer::start(test_config()).await;
    let mut client = server.client().await;

    let response = client
        .capabilities(proto::CapabilityRequest {})
        .await
        .unwrap()
        .into_inner();
    let names: Vec<&str> = response.supported_models.iter().map(|m| m.name.as_str()).collect();
    assert!(names.contains(&"COUNTERS_DB"));
    assert!(names.contains(&"OTHERS"));
    assert!(response.supported_encodings.contains(&(Encoding::JsonIetf as i32)));

    drop(client);
    server.shutdown().await;
}

#[tokio::test]
async fn test_tls_with_client_auth() {
    let dir = tempdir().unwrap();
    let file = |name: &str| dir.path().join(name).to_string_lossy().into_owned();

    generate_self_signed_certificates(&file("server.pem"), &file("server.key")).unwrap();
    generate_self_signed_certificates(&file("client.pem"), &file("client.key")).unwrap();

    let mut config = test_config();
    config.tls.enable_tls = true;
    config.tls.generate_self_signed_certificates = false;
    config.tls.server_certificate_path = file("server.pem");
    config.tls.server_private_key_path = file("server.key");
    config.tls.ca_certificate_path = file("client.pem");
    config.tls.client_auth = true;
    let server = TestServer::start(config).await;

    let server_ca = Certificate::from_pem(fs::read_to_string(file("server.pem")).unwrap());
    let endpoint = |tls: ClientTlsConfig| {
        Channel::from_shared(format!("https://{}", server.addr))
            .unwrap()
            .tls_config(tls.domain_name("localhost"))
            .unwrap()
    };

    // no client certificate: the handshake or the first call fails
    let anonymous = ClientTlsConfig::new().ca_certificate(server_ca.clone());
    let rejected = match endpoint(anonymous).connect().await {
        Err(_) => true,
        Ok(channel) => GNmiClient::new(channel)
            .capabilities(proto::CapabilityRequest {})
            .await
            .is_err(),
    };
    assert!(rejected);

    let identity = Identity::from_pem(
        fs::read_to_string(file("client.pem")).unwrap(),
        fs::read_to_string(file("client.key")).unwrap(),
    );
    let trusted = ClientTlsConfig::new().ca_certificate(server_ca).identity(identity);
    let mut client = GNmiClient::new(endpoint(trusted).connect().await.unwrap());

    let response = client
        .get(get_request("APPL_DB", &["PORT_TABLE", "Ethernet0", "mtu"]))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(
        response.notification[0].update[0].val.as_ref().unwrap().value,
        Some(proto::typed_value::Value::StringVal("9100".into()))
    );
}
