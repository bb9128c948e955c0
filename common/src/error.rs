use thiserror::Error;

// Display text goes to the client verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("bad request, request object has no {0} key")]
    MissingKey(&'static str),
    #[error("bad request, invalid {0}")]
    Invalid(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BodyError {
    #[error("body ended after {received} of {expected} bytes")]
    Incomplete { expected: usize, received: usize },
    #[error("body read failed: {0}")]
    Io(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    #[error("timed out after {attempts} status polls")]
    TimedOut { attempts: u32 },
    #[error("radio error: {0}")]
    Radio(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("pixel strip flush failed: {0}")]
pub struct StripError(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("device actor is not running")]
    Unavailable,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("config field `{0}` must not be empty")]
    Empty(&'static str),
}
