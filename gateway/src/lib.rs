pub mod config;
pub mod metrics_defs;
mod routes;
mod service;

pub use service::{Gateway, GatewayService};

use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use store::KvStore;
use subscription::{GeositeSource, HttpFetcher, Renderer};

const READINESS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(thiserror::Error, Debug)]
pub enum GatewayError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid gateway config: {0}")]
    Config(#[from] config::ValidationError),
}

/// Serves subscriptions on the main listener and probes on the admin
/// listener until either fails.
pub async fn run(config: config::Config, store: Arc<dyn KvStore>) -> Result<(), GatewayError> {
    config.validate()?;

    let fetcher = Arc::new(HttpFetcher::new(Duration::from_secs(config.upstream_timeout_secs)));
    let geo = Arc::new(GeositeSource::new(config.geox.geosite.clone()));
    let renderer = Renderer::new(geo, config.geox.clone());
    let gateway = Gateway::new(
        store.clone(),
        fetcher,
        renderer,
        Duration::from_secs(config.cache_ttl_secs),
    );

    let ready = spawn_readiness_probe(store);
    let admin_service = AdminService::<_, GatewayError>::new(move || ready.load(Ordering::Relaxed));

    let gateway_task = run_http_service(
        &config.listener.host,
        config.listener.port,
        GatewayService::new(Arc::new(gateway)),
    );
    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        admin_service,
    );

    tokio::try_join!(gateway_task, admin_task)?;
    Ok(())
}

/// Pings the store periodically. The flag is false until the first success.
fn spawn_readiness_probe(store: Arc<dyn KvStore>) -> Arc<AtomicBool> {
    let ready = Arc::new(AtomicBool::new(false));
    let flag = ready.clone();

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(READINESS_INTERVAL);
        loop {
            interval.tick().await;
            let ok = match store.ping().await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(error = %e, "store is not reachable");
                    false
                }
            };
            if flag.swap(ok, Ordering::Relaxed) != ok {
                tracing::info!(ready = ok, "readiness changed");
            }
        }
    });

    ready
}
