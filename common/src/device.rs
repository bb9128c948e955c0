use std::{
    sync::mpsc::{self, Receiver, Sender},
    thread,
};

use log::{info, warn};
use serde::Serialize;
use serde_json::Value;

use crate::{
    color::{ColorTable, Kelvin, Rgb},
    error::{DeviceError, StripError, ValidationError},
};

const DEVICE_ACTOR_STACK_SIZE: usize = 32 * 1024;

pub trait PixelStrip: Send {
    fn pixels_mut(&mut self) -> &mut [Rgb];
    fn flush(&mut self) -> Result<(), StripError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coefficients {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Default for Coefficients {
    fn default() -> Self {
        Self {
            r: 1.0,
            g: 1.0,
            b: 1.0,
        }
    }
}

impl Coefficients {
    // All three keys are checked for presence before any range check.
    pub fn from_json(body: &Value) -> Result<Self, ValidationError> {
        let r = required(body, "r")?;
        let g = required(body, "g")?;
        let b = required(body, "b")?;

        Ok(Self {
            r: unit_interval(r, "r")?,
            g: unit_interval(g, "g")?,
            b: unit_interval(b, "b")?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightSetting {
    pub temperature: Kelvin,
    pub brightness: u8,
}

impl LightSetting {
    pub fn from_json(body: &Value) -> Result<Self, ValidationError> {
        let temperature = required(body, "temperature")?;
        let brightness = required(body, "brightness")?;

        let temperature = integral(temperature)
            .and_then(Kelvin::new)
            .ok_or(ValidationError::Invalid("temperature"))?;
        let brightness = integral(brightness)
            .and_then(|value| u8::try_from(value).ok())
            .ok_or(ValidationError::Invalid("brightness"))?;

        Ok(Self {
            temperature,
            brightness,
        })
    }
}

fn required<'a>(body: &'a Value, key: &'static str) -> Result<&'a Value, ValidationError> {
    match body.get(key) {
        None | Some(Value::Null) => Err(ValidationError::MissingKey(key)),
        Some(value) => Ok(value),
    }
}

// `4000.0` is as good as `4000`.
fn integral(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|v| v.fract() == 0.0 && v.abs() <= i64::MAX as f64)
            .map(|v| v as i64)
    })
}

fn unit_interval(value: &Value, key: &'static str) -> Result<f64, ValidationError> {
    value
        .as_f64()
        .filter(|v| (0.0..=1.0).contains(v))
        .ok_or(ValidationError::Invalid(key))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceState {
    pub temperature: Kelvin,
    pub brightness: u8,
    pub coefficients: Coefficients,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            temperature: Kelvin::DEFAULT,
            brightness: u8::MAX,
            coefficients: Coefficients::default(),
        }
    }
}

impl DeviceState {
    // floor(table[t][c] * brightness / 255 * gain[c]) per channel
    pub fn pixel(&self, table: ColorTable) -> Rgb {
        let base = table.rgb(self.temperature);
        let level = f64::from(self.brightness) / 255.0;
        let gain = self.coefficients;

        Rgb::new(
            scale(base.r, level, gain.r),
            scale(base.g, level, gain.g),
            scale(base.b, level, gain.b),
        )
    }
}

fn scale(channel: u8, level: f64, gain: f64) -> u8 {
    (f64::from(channel) * level * gain).floor().clamp(0.0, 255.0) as u8
}

pub struct DeviceEngine<S> {
    state: DeviceState,
    table: ColorTable,
    strip: S,
}

impl<S: PixelStrip> DeviceEngine<S> {
    pub fn new(strip: S) -> Self {
        Self {
            state: DeviceState::default(),
            table: ColorTable,
            strip,
        }
    }

    pub fn boot(strip: S, apply_on_boot: bool) -> Self {
        let mut engine = Self::new(strip);
        if apply_on_boot {
            engine.apply();
        }
        engine
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn apply(&mut self) {
        let color = self.state.pixel(self.table);
        self.strip.pixels_mut().fill(color);
        if let Err(err) = self.strip.flush() {
            warn!("{err}");
        }
    }

    pub fn set_light(&mut self, setting: LightSetting) -> DeviceState {
        info!(
            "temperature: {}, brightness: {}",
            setting.temperature.value(),
            setting.brightness
        );
        self.state.temperature = setting.temperature;
        self.state.brightness = setting.brightness;
        self.apply();
        self.state
    }

    pub fn set_coefficients(&mut self, coefficients: Coefficients) -> DeviceState {
        info!(
            "r: {}, g: {}, b: {}",
            coefficients.r, coefficients.g, coefficients.b
        );
        self.state.coefficients = coefficients;
        self.apply();
        self.state
    }

    pub fn execute(&mut self, command: DeviceCommand) -> DeviceState {
        match command {
            DeviceCommand::Snapshot => self.state,
            DeviceCommand::SetLight(setting) => self.set_light(setting),
            DeviceCommand::SetCoefficients(coefficients) => self.set_coefficients(coefficients),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeviceCommand {
    Snapshot,
    SetLight(LightSetting),
    SetCoefficients(Coefficients),
}

struct Envelope {
    command: DeviceCommand,
    reply: Sender<DeviceState>,
}

// Each command runs to completion on the actor thread before the next is
// taken; the reply is the state right after it.
#[derive(Clone)]
pub struct DeviceHandle {
    tx: Sender<Envelope>,
}

impl DeviceHandle {
    pub fn submit(&self, command: DeviceCommand) -> Result<DeviceState, DeviceError> {
        let (reply, response) = mpsc::channel();
        self.tx
            .send(Envelope { command, reply })
            .map_err(|_| DeviceError::Unavailable)?;
        response.recv().map_err(|_| DeviceError::Unavailable)
    }

    pub fn snapshot(&self) -> Result<DeviceState, DeviceError> {
        self.submit(DeviceCommand::Snapshot)
    }

    pub fn set_light(&self, setting: LightSetting) -> Result<DeviceState, DeviceError> {
        self.submit(DeviceCommand::SetLight(setting))
    }

    pub fn set_coefficients(&self, coefficients: Coefficients) -> Result<DeviceState, DeviceError> {
        self.submit(DeviceCommand::SetCoefficients(coefficients))
    }

    #[cfg(test)]
    pub(crate) fn disconnected() -> Self {
        let (tx, _rx) = mpsc::channel();
        Self { tx }
    }
}

pub fn spawn_device_actor<S>(mut engine: DeviceEngine<S>) -> std::io::Result<DeviceHandle>
where
    S: PixelStrip + 'static,
{
    let (tx, rx): (Sender<Envelope>, Receiver<Envelope>) = mpsc::channel();

    thread::Builder::new()
        .name("device-state".into())
        .stack_size(DEVICE_ACTOR_STACK_SIZE)
        .spawn(move || {
            for Envelope { command, reply } in rx {
                let state = engine.execute(command);
                // The requester may have gone away; the mutation still stands.
                let _ = reply.send(state);
            }
            info!("device actor stopped");
        })?;

    Ok(DeviceHandle { tx })
}
