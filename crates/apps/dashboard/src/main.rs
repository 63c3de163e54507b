use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use api::{ApiClient, ApiConfig};
use clap::Parser;
use dashboard::Dashboard;
use foundation::geo::LngLat;
use foundation::time::SystemClock;
use map::HeadlessMap;
use session::{FileSessionStore, InMemorySessionStore, SessionStore};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const BASE_STYLE: &str = "https://basemaps.cartocdn.com/gl/positron-gl-style/style.json";

#[derive(Parser, Debug)]
#[command(author, version, about = "Air-quality map dashboard on a headless map host")]
struct Args {
    /// API base URL (default: AIRQ_API_BASE_URL, then http://localhost:8000)
    #[arg(long)]
    api_base_url: Option<String>,

    /// Seconds between refresh cycles
    #[arg(long, default_value_t = 300)]
    refresh_secs: u64,

    /// JSON file holding the saved view and credentials; in memory if unset
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Run a single refresh cycle and exit
    #[arg(long)]
    once: bool,

    /// Initial map center longitude
    #[arg(long, default_value_t = 29.87)]
    lng: f64,

    /// Initial map center latitude
    #[arg(long, default_value_t = -1.94, allow_hyphen_values = true)]
    lat: f64,

    #[arg(long, default_value_t = 8.0)]
    zoom: f64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut config = ApiConfig::from_env();
    if let Some(url) = &args.api_base_url {
        config = ApiConfig::new(url.as_str()).with_timeout(config.timeout);
    }
    let center = LngLat::new(args.lng, args.lat);
    if !center.is_valid() {
        error!(lng = args.lng, lat = args.lat, "invalid map center");
        return ExitCode::FAILURE;
    }

    let api = match ApiClient::new(config) {
        Ok(api) => api,
        Err(e) => {
            error!(error = %e, "cannot create API client");
            return ExitCode::FAILURE;
        }
    };
    let session: Box<dyn SessionStore> = match &args.state_file {
        Some(path) => match FileSessionStore::open(path) {
            Ok(store) => Box::new(store),
            Err(e) => {
                error!(path = %path.display(), error = %e, "cannot open state file");
                return ExitCode::FAILURE;
            }
        },
        None => Box::new(InMemorySessionStore::new()),
    };

    let mut host = HeadlessMap::initialize("map", BASE_STYLE, center, args.zoom);
    host.load();
    let mut dash = Dashboard::new(host, api, session, Arc::new(SystemClock));
    info!(api = %dash.datasets().api().config().base_url, "dashboard started");

    let period = Duration::from_secs(args.refresh_secs.max(1));
    loop {
        if dash.refresh().await {
            let failed = dash
                .snapshot()
                .map(|s| s.errors().len())
                .unwrap_or_default();
            let legends: Vec<String> = dash.legends().into_iter().map(|l| l.title).collect();
            info!(?legends, failed, "refreshed");
            if args.once && failed > 0 {
                warn!(failed, "some datasets could not be loaded");
                dash.shutdown();
                return ExitCode::FAILURE;
            }
        }
        if args.once {
            break;
        }
        dash.tick();
        tokio::time::sleep(period).await;
    }

    dash.shutdown();
    ExitCode::SUCCESS
}
