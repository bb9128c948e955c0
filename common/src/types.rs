use serde::Serialize;

use crate::device::{Coefficients, DeviceState};

pub const READY_MESSAGE: &str = "I'm as ready as I'll ever be!";

// Field order in these structs is the order on the wire.

#[derive(Debug, Clone, Copy, Serialize)]
pub struct MemoryState {
    pub free: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthView {
    pub message: &'static str,
    pub state: MemoryState,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoefficientsView {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub error: Option<String>,
}

impl From<Coefficients> for CoefficientsView {
    fn from(value: Coefficients) -> Self {
        Self {
            r: value.r,
            g: value.g,
            b: value.b,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LightView {
    pub temperature: u16,
    pub brightness: u8,
    pub error: Option<String>,
}

impl From<&DeviceState> for LightView {
    fn from(state: &DeviceState) -> Self {
        Self {
            temperature: state.temperature.value(),
            brightness: state.brightness,
            error: None,
        }
    }
}

// Brightness leads here, unlike `LightView`.
#[derive(Debug, Clone, Serialize)]
pub struct LightUpdated {
    pub brightness: u8,
    pub temperature: u16,
    pub error: Option<String>,
}

impl From<&DeviceState> for LightUpdated {
    fn from(state: &DeviceState) -> Self {
        Self {
            brightness: state.brightness,
            temperature: state.temperature.value(),
            error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
