use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use gnmi_telemetry::proto;
use gnmi_telemetry::proto::g_nmi_client::GNmiClient;
use gnmi_telemetry::serve_with_listener;
use gnmi_telemetry::DataStore;
use gnmi_telemetry::FieldMap;
use gnmi_telemetry::KeyChange;
use gnmi_telemetry::MemoryStore;
use gnmi_telemetry::ServerBuilder;
use gnmi_telemetry::StoreHandle;
use gnmi_telemetry::StoreResult;
use gnmi_telemetry::StoreWriter;
use gnmi_telemetry::TelemetryConfig;
use gnmi_telemetry::VersionInfo;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tonic::async_trait;
use tonic::transport::Channel;
use tonic::Streaming;
use tracing_subscriber::EnvFilter;

pub const BUILD_VERSION: &str = "sonic.it.20261014";
pub const ETHERNET0_OID: &str = "oid:0x1000000000002";

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
}

pub fn fields(pairs: &[(&str, &str)]) -> FieldMap {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

pub async fn seeded_store() -> StoreHandle {
    let store = StoreHandle::from_backend(Arc::new(MemoryStore::new(1024)));
    let rows = [
        (
            "COUNTERS_DB",
            "COUNTERS_PORT_NAME_MAP",
            fields(&[("Ethernet0", ETHERNET0_OID)]),
        ),
        (
            "COUNTERS_DB",
            "COUNTERS:oid:0x1000000000002",
            fields(&[("SAI_PORT_STAT_IF_IN_ERRORS", "0"), ("SAI_PORT_STAT_IF_IN_OCTETS", "1000")]),
        ),
        (
            "APPL_DB",
            "PORT_TABLE:Ethernet0",
            fields(&[("oper_status", "up"), ("mtu", "9100")]),
        ),
        ("CONFIG_DB", "FEATURE|telemetry", fields(&[("status", "enabled")])),
    ];
    for (db, key, fields) in rows {
        store.writer.set_entry(db, key, fields).await.unwrap();
    }
    store
}

/// Accepts every read and never answers it
pub struct HangingStore {
    inner: MemoryStore,
}

impl HangingStore {
    /// Reads hang while writes still land in an in-memory store
    pub fn handle() -> StoreHandle {
        let hanging = Arc::new(Self {
            inner: MemoryStore::new(16),
        });
        StoreHandle {
            reader: hanging,
            writer: Arc::new(MemoryStore::new(16)),
        }
    }
}

#[async_trait]
impl DataStore for HangingStore {
    async fn get_entry(
        &self,
        _db: &str,
        _key: &str,
    ) -> StoreResult<Option<FieldMap>> {
        std::future::pending().await
    }

    async fn get_field(
        &self,
        _db: &str,
        _key: &str,
        _field: &str,
    ) -> StoreResult<Option<String>> {
        std::future::pending().await
    }

    async fn scan_prefix(
        &self,
        _db: &str,
        _prefix: &str,
    ) -> StoreResult<Vec<(String, FieldMap)>> {
        std::future::pending().await
    }

    fn changes(&self) -> broadcast::Receiver<KeyChange> {
        self.inner.changes()
    }
}

/// Server listening on an ephemeral loopback port
pub struct TestServer {
    pub addr: SocketAddr,
    pub store: StoreHandle,
    shutdown_tx: watch::Sender<()>,
    handle: JoinHandle<gnmi_telemetry::Result<()>>,
}

impl TestServer {
    pub async fn start(config: TelemetryConfig) -> Self {
        Self::start_with_store(config, seeded_store().await).await
    }

    pub async fn start_with_store(
        config: TelemetryConfig,
        store: StoreHandle,
    ) -> Self {
        enable_logger();
        let (shutdown_tx, shutdown_rx) = watch::channel(());

        let mut version = BTreeMap::new();
        version.insert("build_version".to_string(), BUILD_VERSION.to_string());

        let server = ServerBuilder::new(config.clone(), store.clone(), shutdown_rx.clone())
            .version(Arc::new(VersionInfo::from_fields(version)))
            .build()
            .ready()
            .unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move { serve_with_listener(server, listener, &config, shutdown_rx).await });

        Self {
            addr,
            store,
            shutdown_tx,
            handle,
        }
    }

    pub async fn client(&self) -> GNmiClient<Channel> {
        GNmiClient::connect(format!("http://{}", self.addr)).await.unwrap()
    }

    pub async fn shutdown(self) {
        self.shutdown_tx.send(()).unwrap();
        self.handle.await.unwrap().unwrap();
    }
}

pub fn test_config() -> TelemetryConfig {
    let mut config = TelemetryConfig::default();
    config.server.get_timeout_ms = 2_000;
    config.dispatcher.default_sample_interval_ms = 1_000;
    config
}

pub fn path(
    target: &str,
    elems: &[&str],
) -> proto::Path {
    proto::Path {
        origin: String::new(),
        elem: elems
            .iter()
            .map(|name| proto::PathElem {
                name: name.to_string(),
                key: Default::default(),
            })
            .collect(),
        target: target.to_string(),
    }
}

pub fn json_ietf_update(update: &proto::Update) -> serde_json::Value {
    match update.val.as_ref().and_then(|v| v.value.as_ref()) {
        Some(proto::typed_value::Value::JsonIetfVal(bytes)) => serde_json::from_slice(bytes).unwrap(),
        other => panic!("expected json_ietf_val, got {:?}", other),
    }
}

pub fn update_names(update: &proto::Update) -> Vec<String> {
    update
        .path
        .as_ref()
        .map(|p| p.elem.iter().map(|e| e.name.clone()).collect())
        .unwrap_or_default()
}

/// Opens a Subscribe call; the returned sender keeps the client side open
pub async fn subscribe(
    client: &mut GNmiClient<Channel>,
    list: proto::SubscriptionList,
) -> Result<(mpsc::Sender<proto::SubscribeRequest>, Streaming<proto::SubscribeResponse>), tonic::Status> {
    let (tx, rx) = mpsc::channel(8);
    tx.send(proto::SubscribeRequest {
        request: Some(proto::subscribe_request::Request::Subscribe(list)),
    })
    .await
    .unwrap();

    let response = client.subscribe(ReceiverStream::new(rx)).await?;
    Ok((tx, response.into_inner()))
}
