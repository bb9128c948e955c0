pub mod api;
pub mod color;
pub mod config;
pub mod device;
pub mod error;
pub mod pipeline;
pub mod service;
pub mod supervisor;
pub mod types;

pub use api::{build_dispatcher, MemoryGauge};
pub use color::{ColorTable, Kelvin, Rgb};
pub use config::{HttpConfig, RuntimeConfig, StripConfig, SupervisorConfig};
pub use device::{spawn_device_actor, DeviceEngine, DeviceHandle, DeviceState, PixelStrip};
pub use error::{ConfigError, ConnectError, DeviceError, StripError};
pub use pipeline::{BodyReader, BufferedBody, Dispatcher, Method, Request, Response};
pub use service::{CycleOutcome, Platform};
pub use supervisor::{
    ConnectionState, ConnectivitySupervisor, LinkInfo, LinkSettings, Sleeper, ThreadSleeper,
    WifiRadio,
};
