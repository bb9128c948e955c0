use std::{net::Ipv4Addr, sync::Arc, thread, time::Duration};

use anyhow::{ensure, Context};
use embedded_svc::{
    http::{Headers, Method as HttpMethod},
    io::{Read, Write},
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{gpio::AnyOutputPin, prelude::Peripherals, rmt::CHANNEL0},
    http::server::{Configuration as HttpConfiguration, EspHttpServer},
    log::EspLogger,
    nvs::{EspDefaultNvsPartition, EspNvs},
    sys::EspError,
    wifi::EspWifi,
};
use log::{info, warn};
use smart_leds_trait::{SmartLedsWrite, RGB8};
use ws2812_esp32_rmt_driver::{driver::color::LedPixelColorGrb24, LedPixelEsp32Rmt};

use cctlight_common::{
    build_dispatcher, config::DEFAULT_HOSTNAME, error::BodyError, service, spawn_device_actor,
    BodyReader, ConnectivitySupervisor, DeviceEngine, Dispatcher, LinkInfo, LinkSettings,
    MemoryGauge, Method, PixelStrip, Platform, Request, Rgb, RuntimeConfig, StripError,
    ThreadSleeper, WifiRadio,
};

const NVS_NAMESPACE: &str = "cctlight";
const NVS_CONFIG_KEY: &str = "config_json";
const NVS_BUFFER_LEN: usize = 1024;
const HTTP_STACK_SIZE: usize = 16 * 1024;
const LINK_CHECK_INTERVAL: Duration = Duration::from_secs(1);

// esp-idf answers unregistered methods itself, so every method the parser
// knows is routed into the dispatcher and gets its 405 body.
const SERVED_METHODS: [(HttpMethod, &str); 19] = [
    (HttpMethod::Get, "GET"),
    (HttpMethod::Head, "HEAD"),
    (HttpMethod::Post, "POST"),
    (HttpMethod::Put, "PUT"),
    (HttpMethod::Patch, "PATCH"),
    (HttpMethod::Delete, "DELETE"),
    (HttpMethod::Options, "OPTIONS"),
    (HttpMethod::Connect, "CONNECT"),
    (HttpMethod::Trace, "TRACE"),
    (HttpMethod::Copy, "COPY"),
    (HttpMethod::Lock, "LOCK"),
    (HttpMethod::Unlock, "UNLOCK"),
    (HttpMethod::Move, "MOVE"),
    (HttpMethod::Propfind, "PROPFIND"),
    (HttpMethod::Proppatch, "PROPPATCH"),
    (HttpMethod::Search, "SEARCH"),
    (HttpMethod::Purge, "PURGE"),
    (HttpMethod::Link, "LINK"),
    (HttpMethod::Unlink, "UNLINK"),
];

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;

    let mut config = load_runtime_config(&nvs_partition).unwrap_or_else(|err| {
        warn!("failed to load runtime config from NVS: {err:#}");
        RuntimeConfig::default()
    });
    ensure_wifi_defaults(&mut config);
    config.sanitize();
    ensure!(
        !config.ssid.is_empty(),
        "no wifi credentials in NVS or build environment"
    );

    info!(
        "config loaded: ssid=`{}`, hostname=`{}`, {} leds on GPIO{}",
        config.ssid, config.hostname, config.strip.led_count, config.strip.pin
    );

    let Peripherals { modem, rmt, .. } = Peripherals::take()?;

    let strip = Ws2812Strip::new(rmt.channel0, config.strip.pin, config.strip.led_count)?;
    let engine = DeviceEngine::boot(strip, config.strip.apply_on_boot);
    let device = spawn_device_actor(engine).context("failed to start device actor")?;
    let dispatcher = Arc::new(build_dispatcher(device, Arc::new(EspHeap)));

    let radio = StationRadio {
        wifi: EspWifi::new(modem, sys_loop, Some(nvs_partition))?,
    };
    let mut supervisor =
        ConnectivitySupervisor::new(radio, ThreadSleeper, LinkSettings::from(&config));
    let mut platform = EspPlatform {
        dispatcher,
        port: config.http.port,
    };

    service::run(
        &mut supervisor,
        &mut platform,
        config.supervisor.reentry_delay(),
    )
}

fn load_runtime_config(partition: &EspDefaultNvsPartition) -> anyhow::Result<RuntimeConfig> {
    let nvs = EspNvs::new(partition.clone(), NVS_NAMESPACE, true)?;
    let mut buffer = vec![0_u8; NVS_BUFFER_LEN];

    match nvs.get_str(NVS_CONFIG_KEY, &mut buffer)? {
        Some(value) => Ok(RuntimeConfig::from_json(value.as_bytes())?),
        None => Ok(RuntimeConfig::default()),
    }
}

fn ensure_wifi_defaults(config: &mut RuntimeConfig) {
    if config.ssid.is_empty() {
        if let Some(ssid) = option_env!("WIFI_SSID") {
            config.ssid = ssid.to_string();
        }
    }

    if config.psk.is_empty() {
        if let Some(psk) = option_env!("WIFI_PASS") {
            config.psk = psk.to_string();
        }
    }

    if let Some(hostname) = option_env!("WIFI_HOSTNAME") {
        if config.hostname == DEFAULT_HOSTNAME {
            config.hostname = hostname.to_string();
        }
    }
}

struct EspPlatform {
    dispatcher: Arc<Dispatcher>,
    port: u16,
}

impl Platform for EspPlatform {
    type Error = anyhow::Error;

    fn prepare_to_serve(&mut self) {
        info!("free heap: {} bytes", EspHeap.free_bytes());
    }

    // Blocks while the station link is up; the server is dropped on return.
    fn serve(&mut self) -> anyhow::Result<()> {
        let _server = create_http_server(self.dispatcher.clone(), self.port)?;
        info!("HTTP server listening on port {}", self.port);

        while is_wifi_station_connected() {
            thread::sleep(LINK_CHECK_INTERVAL);
        }

        warn!("wifi link lost, stopping HTTP server");
        Ok(())
    }

    fn restart(&mut self) -> ! {
        warn!("restarting");
        esp_idf_svc::hal::reset::restart()
    }
}

fn create_http_server(
    dispatcher: Arc<Dispatcher>,
    port: u16,
) -> anyhow::Result<EspHttpServer<'static>> {
    let conf = HttpConfiguration {
        http_port: port,
        stack_size: HTTP_STACK_SIZE,
        uri_match_wildcard: true,
        max_uri_handlers: SERVED_METHODS.len(),
        ..Default::default()
    };

    let mut server = EspHttpServer::new(&conf)?;

    for (http_method, name) in SERVED_METHODS {
        let method = Method::parse(name);
        let dispatcher = dispatcher.clone();
        server.fn_handler::<anyhow::Error, _>("/*", http_method, move |mut req| {
            let mut request = Request::new(method.clone(), req.uri());
            if let Some(content_type) = req.header("Content-Type") {
                request.insert_header("content-type", content_type);
            }
            if let Some(len) = req.content_len() {
                request.insert_header("content-length", &len.to_string());
            }

            let response = dispatcher.dispatch(request, &mut ConnectionBody { reader: &mut req });

            req.into_response(
                response.status,
                None,
                &[("Content-Type", response.content_type())],
            )?
            .write_all(&response.body_bytes())?;
            Ok(())
        })?;
    }

    Ok(server)
}

struct ConnectionBody<'a, R> {
    reader: &'a mut R,
}

impl<R: Read> BodyReader for ConnectionBody<'_, R> {
    fn read_exact(&mut self, len: usize) -> Result<Vec<u8>, BodyError> {
        let mut body = vec![0_u8; len];
        let mut received = 0;
        while received < len {
            match self.reader.read(&mut body[received..]) {
                Ok(0) => {
                    return Err(BodyError::Incomplete {
                        expected: len,
                        received,
                    })
                }
                Ok(n) => received += n,
                Err(err) => return Err(BodyError::Io(format!("{err:?}"))),
            }
        }
        Ok(body)
    }

    fn drain(&mut self) {
        let mut scratch = [0_u8; 256];
        while matches!(self.reader.read(&mut scratch), Ok(n) if n > 0) {}
    }
}

struct StationRadio {
    wifi: EspWifi<'static>,
}

impl WifiRadio for StationRadio {
    type Error = EspError;

    fn is_connected(&mut self) -> Result<bool, EspError> {
        Ok(self.wifi.is_connected()? && self.wifi.is_up()?)
    }

    fn activate(&mut self) -> Result<(), EspError> {
        if !self.wifi.is_started()? {
            self.wifi.start()?;
        }
        Ok(())
    }

    fn set_hostname(&mut self, hostname: &str) -> Result<(), EspError> {
        self.wifi.sta_netif_mut().set_hostname(hostname)
    }

    fn connect(&mut self, ssid: &str, psk: &str) -> Result<(), EspError> {
        let auth_method = if psk.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPAWPA2Personal
        };

        // Over-long credentials leave the field empty; the poll then times out.
        self.wifi
            .set_configuration(&Configuration::Client(ClientConfiguration {
                ssid: ssid.try_into().unwrap_or_default(),
                password: psk.try_into().unwrap_or_default(),
                auth_method,
                ..Default::default()
            }))?;
        self.wifi.connect()
    }

    fn link_info(&mut self) -> Option<LinkInfo> {
        let info = self.wifi.sta_netif().get_ip_info().ok()?;
        Some(LinkInfo {
            address: info.ip,
            netmask: Ipv4Addr::from(info.subnet.mask),
            gateway: info.subnet.gateway,
            dns: info.dns,
        })
    }
}

fn is_wifi_station_connected() -> bool {
    let mut ap_info = esp_idf_svc::sys::wifi_ap_record_t::default();
    let rc = unsafe { esp_idf_svc::sys::esp_wifi_sta_get_ap_info(&mut ap_info) };
    rc == esp_idf_svc::sys::ESP_OK
}

struct EspHeap;

impl MemoryGauge for EspHeap {
    fn free_bytes(&self) -> u64 {
        u64::from(unsafe { esp_idf_svc::sys::esp_get_free_heap_size() })
    }
}

struct Ws2812Strip {
    driver: LedPixelEsp32Rmt<'static, RGB8, LedPixelColorGrb24>,
    pixels: Vec<Rgb>,
}

impl Ws2812Strip {
    fn new(channel: CHANNEL0, pin: u8, len: usize) -> anyhow::Result<Self> {
        let pin = unsafe { AnyOutputPin::new(i32::from(pin)) };
        let driver = LedPixelEsp32Rmt::<RGB8, LedPixelColorGrb24>::new(channel, pin)
            .map_err(|err| anyhow::anyhow!("failed to init ws2812 driver: {err:?}"))?;

        Ok(Self {
            driver,
            pixels: vec![Rgb::default(); len],
        })
    }
}

impl PixelStrip for Ws2812Strip {
    fn pixels_mut(&mut self) -> &mut [Rgb] {
        &mut self.pixels
    }

    fn flush(&mut self) -> Result<(), StripError> {
        let frame = self.pixels.iter().map(|px| RGB8::new(px.r, px.g, px.b));
        self.driver
            .write(frame)
            .map_err(|err| StripError(format!("{err:?}")))
    }
}
