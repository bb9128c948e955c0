use std::{
    io::ErrorKind,
    net::{Ipv4Addr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode, Uri},
    response::IntoResponse,
    Json, Router,
};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use cctlight_common::{
    build_dispatcher, service, spawn_device_actor, types::ErrorBody, BufferedBody,
    ConnectivitySupervisor, DeviceEngine, Dispatcher, LinkInfo, LinkSettings, MemoryGauge,
    Method, PixelStrip, Platform, Request, Rgb, RuntimeConfig, StripError, ThreadSleeper,
    WifiRadio,
};

const SIM_SSID: &str = "cctlight-sim";

pub fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = load_runtime_config().unwrap_or_else(|err| {
        warn!("failed to load runtime config: {err:#}");
        RuntimeConfig {
            ssid: SIM_SSID.to_string(),
            ..RuntimeConfig::default()
        }
    });

    let strip = LoggingStrip::new(config.strip.led_count);
    let engine = DeviceEngine::boot(strip, config.strip.apply_on_boot);
    let device = spawn_device_actor(engine).context("failed to start device actor")?;

    let memory = Arc::new(ProcMeminfo);
    let dispatcher = Arc::new(build_dispatcher(device, memory.clone()));

    let port = std::env::var("CCTLIGHT_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let radio = SimRadio::from_env();
    let mut supervisor =
        ConnectivitySupervisor::new(radio, ThreadSleeper, LinkSettings::from(&config));
    let mut platform = HostPlatform {
        dispatcher,
        memory,
        port,
    };

    service::run(
        &mut supervisor,
        &mut platform,
        config.supervisor.reentry_delay(),
    )
}

fn load_runtime_config() -> anyhow::Result<RuntimeConfig> {
    let path = std::env::var("CCTLIGHT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.json"));

    match std::fs::read(&path) {
        Ok(raw) => RuntimeConfig::from_json(&raw)
            .with_context(|| format!("invalid config at {}", path.display())),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            info!("no config at {}, using defaults", path.display());
            Ok(RuntimeConfig {
                ssid: SIM_SSID.to_string(),
                ..RuntimeConfig::default()
            })
        }
        Err(err) => Err(err.into()),
    }
}

struct HostPlatform {
    dispatcher: Arc<Dispatcher>,
    memory: Arc<ProcMeminfo>,
    port: u16,
}

impl Platform for HostPlatform {
    type Error = anyhow::Error;

    fn prepare_to_serve(&mut self) {
        info!("free memory: {} bytes", self.memory.free_bytes());
    }

    fn serve(&mut self) -> anyhow::Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to build tokio runtime")?;
        runtime.block_on(serve_http(self.dispatcher.clone(), self.port))
    }

    fn restart(&mut self) -> ! {
        warn!("restart requested, exiting");
        std::process::exit(1)
    }
}

async fn serve_http(dispatcher: Arc<Dispatcher>, port: u16) -> anyhow::Result<()> {
    let app = Router::new().fallback(handle).with_state(dispatcher);

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind http server at {addr}"))?;

    info!("listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn handle(
    State(dispatcher): State<Arc<Dispatcher>>,
    method: axum::http::Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> axum::response::Response {
    let target = uri.path_and_query().map_or("/", |pq| pq.as_str());
    let mut request = Request::new(Method::parse(method.as_str()), target);
    for (name, value) in &headers {
        if let Ok(value) = value.to_str() {
            request.insert_header(name.as_str(), value);
        }
    }

    let response = tokio::task::spawn_blocking(move || {
        dispatcher.dispatch(request, &mut BufferedBody::new(body.to_vec()))
    })
    .await;

    match response {
        Ok(response) => {
            let status =
                StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (
                status,
                [(CONTENT_TYPE, response.content_type())],
                response.body_bytes(),
            )
                .into_response()
        }
        Err(err) => {
            warn!("request handler panicked: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (status, Json(ErrorBody::new(message))).into_response()
}

// `CCTLIGHT_SIM_LINK` is either `fail` or the number of status polls before
// the link comes up.
struct SimRadio {
    associated: bool,
    polls: u32,
    polls_until_up: Option<u32>,
}

impl SimRadio {
    fn from_env() -> Self {
        let polls_until_up = match std::env::var("CCTLIGHT_SIM_LINK") {
            Ok(value) if value.eq_ignore_ascii_case("fail") => None,
            Ok(value) => Some(value.parse().unwrap_or(0)),
            Err(_) => Some(0),
        };

        Self {
            associated: false,
            polls: 0,
            polls_until_up,
        }
    }
}

impl WifiRadio for SimRadio {
    type Error = std::convert::Infallible;

    fn is_connected(&mut self) -> Result<bool, Self::Error> {
        if !self.associated {
            return Ok(false);
        }
        self.polls += 1;
        Ok(self
            .polls_until_up
            .is_some_and(|threshold| self.polls > threshold))
    }

    fn activate(&mut self) -> Result<(), Self::Error> {
        debug!("sim radio: activate");
        Ok(())
    }

    fn set_hostname(&mut self, hostname: &str) -> Result<(), Self::Error> {
        debug!("sim radio: hostname {hostname}");
        Ok(())
    }

    fn connect(&mut self, ssid: &str, _psk: &str) -> Result<(), Self::Error> {
        debug!("sim radio: associating with {ssid}");
        self.associated = true;
        self.polls = 0;
        Ok(())
    }

    fn link_info(&mut self) -> Option<LinkInfo> {
        Some(LinkInfo {
            address: Ipv4Addr::LOCALHOST,
            netmask: Ipv4Addr::new(255, 0, 0, 0),
            gateway: Ipv4Addr::LOCALHOST,
            dns: None,
        })
    }
}

struct LoggingStrip {
    pixels: Vec<Rgb>,
}

impl LoggingStrip {
    fn new(len: usize) -> Self {
        Self {
            pixels: vec![Rgb::default(); len],
        }
    }
}

impl PixelStrip for LoggingStrip {
    fn pixels_mut(&mut self) -> &mut [Rgb] {
        &mut self.pixels
    }

    fn flush(&mut self) -> Result<(), StripError> {
        if let Some(first) = self.pixels.first() {
            info!(
                "strip: {} pixels at ({}, {}, {})",
                self.pixels.len(),
                first.r,
                first.g,
                first.b
            );
        }
        Ok(())
    }
}

struct ProcMeminfo;

impl MemoryGauge for ProcMeminfo {
    fn free_bytes(&self) -> u64 {
        std::fs::read_to_string("/proc/meminfo")
            .ok()
            .and_then(|meminfo| {
                meminfo
                    .lines()
                    .find_map(|line| line.strip_prefix("MemAvailable:"))
                    .and_then(|rest| rest.trim().trim_end_matches("kB").trim().parse::<u64>().ok())
            })
            .map_or(0, |kib| kib * 1024)
    }
}
