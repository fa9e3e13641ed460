use lazy_static::lazy_static;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use warp::Filter;
use warp::Rejection;
use warp::Reply;


lazy_static! {
    pub static ref ACTIVE_SESSIONS: IntGauge =
        IntGauge::new("active_sessions", "Number of live subscription sessions")
            .expect("metric can not be created");

    pub static ref UPDATES_SENT: IntCounterVec = IntCounterVec::new(
        Opts::new("updates_sent", "Notifications delivered to subscribers"),
        &["mode"]
    )
    .expect("metric can not be created");

    pub static ref STORE_READ_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("store_read_failures", "Failed data store read attempts"),
        &["db"]
    )
    .expect("metric can not be created");

    pub static ref GET_REQUESTS: IntCounterVec = IntCounterVec::new(
        Opts::new("get_requests", "GET requests by outcome"),
        &["status"]
    )
    .expect("metric can not be created");

    pub static ref REJECTED_REQUESTS: IntCounterVec = IntCounterVec::new(
        Opts::new("rejected_requests", "Requests rejected before a session was created"),
        &["reason"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

pub(crate) fn register_custom_metrics(registry: &Registry) {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(ACTIVE_SESSIONS.clone()),
        Box::new(UPDATES_SENT.clone()),
        Box::new(STORE_READ_FAILURES.clone()),
        Box::new(GET_REQUESTS.clone()),
        Box::new(REJECTED_REQUESTS.clone()),
    ];
    for collector in collectors {
        // AlreadyReg on a second call is harmless
        if let Err(e) = registry.register(collector) {
            tracing::debug!("collector not registered: {}", e);
        }
    }
}

/// Serves `/metrics` until `shutdown_signal` fires
pub async fn start_server(
    port: u16,
    mut shutdown_signal: watch::Receiver<()>,
) {
    register_custom_metrics(&REGISTRY);

    let metrics_route = warp::path!("metrics")
        .map(|| REGISTRY.clone())
        .and_then(metrics_handler);

    info!("Prometheus exporter listening on 0.0.0.0:{}", port);
    let (_, server) = warp::serve(metrics_route).bind_with_graceful_shutdown(([0, 0, 0, 0], port), async move {
        let _ = shutdown_signal.changed().await;
    });
    server.await;
}

async fn metrics_handler(registry: Registry) -> Result<impl Reply, Rejection> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        error!("could not encode custom metrics: {}", e);
    };
    let res = match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            error!("custom metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    };
    Ok(res)
}
