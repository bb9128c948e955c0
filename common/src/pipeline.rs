use std::collections::BTreeMap;

use log::{debug, info, warn};
use serde::Serialize;
use serde_json::Value;

use crate::{error::BodyError, types::ErrorBody};

pub const MAX_BODY_BYTES: usize = 4096;

pub const MSG_METHOD_NOT_ALLOWED: &str = "method not allowed";
pub const MSG_INVALID_CONTENT_TYPE: &str = "bad request, invalid content type";
pub const MSG_MISSING_CONTENT_LENGTH: &str =
    "bad request, content length is not specified or zero";
pub const MSG_INCOMPLETE_BODY: &str = "bad request, incomplete body";
pub const MSG_MALFORMED_JSON: &str = "bad request, malformed json";
pub const MSG_PAYLOAD_TOO_LARGE: &str = "payload too large";
pub const MSG_NOT_FOUND: &str = "not found";

const JSON_CONTENT_TYPE: &str = "application/json";
const TEXT_CONTENT_TYPE: &str = "text/plain";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
    Other(String),
}

impl Method {
    // Method names are case-sensitive.
    pub fn parse(value: &str) -> Self {
        match value {
            "GET" => Self::Get,
            "HEAD" => Self::Head,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "PATCH" => Self::Patch,
            "DELETE" => Self::Delete,
            "OPTIONS" => Self::Options,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
            Self::Other(name) => name,
        }
    }

    pub fn carries_body(&self) -> bool {
        matches!(self, Self::Put | Self::Post | Self::Patch)
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    headers: BTreeMap<String, String>,
    pub body: Option<Vec<u8>>,
    pub json: Option<Value>,
}

impl Request {
    pub fn new(method: Method, target: &str) -> Self {
        let path = target.split_once('?').map_or(target, |(path, _)| path);
        Self {
            method,
            path: path.to_string(),
            headers: BTreeMap::new(),
            body: None,
            json: None,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.insert_header(name, value);
        self
    }

    pub fn insert_header(&mut self, name: &str, value: &str) {
        self.headers
            .insert(name.to_ascii_lowercase(), value.trim().to_string());
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

pub trait BodyReader {
    fn read_exact(&mut self, len: usize) -> Result<Vec<u8>, BodyError>;

    fn drain(&mut self);
}

#[derive(Debug, Clone, Default)]
pub struct BufferedBody {
    data: Vec<u8>,
    pos: usize,
}

impl BufferedBody {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            pos: 0,
        }
    }
}

impl BodyReader for BufferedBody {
    fn read_exact(&mut self, len: usize) -> Result<Vec<u8>, BodyError> {
        let remaining = self.data.len() - self.pos;
        if remaining < len {
            self.pos = self.data.len();
            return Err(BodyError::Incomplete {
                expected: len,
                received: remaining,
            });
        }

        let chunk = self.data[self.pos..self.pos + len].to_vec();
        self.pos += len;
        Ok(chunk)
    }

    fn drain(&mut self) {
        self.pos = self.data.len();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Json(Value),
    Text(String),
}

impl Body {
    pub fn json<T: Serialize>(payload: &T) -> Self {
        match serde_json::to_value(payload) {
            Ok(value) => Self::Json(value),
            Err(err) => Self::Text(err.to_string()),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Body,
}

impl Response {
    pub fn new(status: u16, body: Body) -> Self {
        Self { status, body }
    }

    pub fn error(status: u16, message: &str) -> Self {
        Self::new(status, Body::json(&ErrorBody::new(message)))
    }

    pub fn status_line(&self) -> String {
        format!("HTTP/1.1 {}", self.status)
    }

    pub fn content_type(&self) -> &'static str {
        match &self.body {
            Body::Json(Value::Object(_) | Value::Array(_)) => JSON_CONTENT_TYPE,
            _ => TEXT_CONTENT_TYPE,
        }
    }

    pub fn body_bytes(&self) -> Vec<u8> {
        match &self.body {
            Body::Json(value @ (Value::Object(_) | Value::Array(_))) => {
                value.to_string().into_bytes()
            }
            Body::Json(Value::String(text)) | Body::Text(text) => text.clone().into_bytes(),
            Body::Json(Value::Null) => Vec::new(),
            Body::Json(scalar) => scalar.to_string().into_bytes(),
        }
    }
}

pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response {
        self
    }
}

impl IntoResponse for Body {
    fn into_response(self) -> Response {
        Response::new(200, self)
    }
}

impl IntoResponse for (u16, Body) {
    fn into_response(self) -> Response {
        Response::new(self.0, self.1)
    }
}

pub type Handler = Box<dyn Fn(&Request) -> Response + Send + Sync>;

pub struct Route {
    path: String,
    methods: Vec<Method>,
    handler: Handler,
}

impl Route {
    pub fn new<F, R>(path: &str, methods: &[Method], handler: F) -> Self
    where
        F: Fn(&Request) -> R + Send + Sync + 'static,
        R: IntoResponse,
    {
        Self {
            path: path.to_string(),
            methods: methods.to_vec(),
            handler: Box::new(move |req: &Request| handler(req).into_response()),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn allows(&self, method: &Method) -> bool {
        self.methods.contains(method)
    }
}

pub enum Flow {
    Continue,
    Respond(Response),
}

pub trait Middleware: Send + Sync {
    fn handle(&self, route: &Route, request: &mut Request, body: &mut dyn BodyReader) -> Flow;
}

pub struct LogRequest;

impl Middleware for LogRequest {
    fn handle(&self, _route: &Route, request: &mut Request, _body: &mut dyn BodyReader) -> Flow {
        info!("{} {}", request.method.as_str(), request.path);
        Flow::Continue
    }
}

pub struct MethodGuard;

impl Middleware for MethodGuard {
    fn handle(&self, route: &Route, request: &mut Request, body: &mut dyn BodyReader) -> Flow {
        if route.allows(&request.method) {
            return Flow::Continue;
        }

        body.drain();
        Flow::Respond(Response::error(405, MSG_METHOD_NOT_ALLOWED))
    }
}

// Content negotiation and JSON decoding for PUT, POST and PATCH.
pub struct JsonBody {
    max_len: usize,
}

impl Default for JsonBody {
    fn default() -> Self {
        Self {
            max_len: MAX_BODY_BYTES,
        }
    }
}

impl JsonBody {
    pub fn with_limit(max_len: usize) -> Self {
        Self { max_len }
    }

    fn reject(body: &mut dyn BodyReader, status: u16, message: &str) -> Flow {
        warn!("{message}");
        body.drain();
        Flow::Respond(Response::error(status, message))
    }
}

impl Middleware for JsonBody {
    fn handle(&self, _route: &Route, request: &mut Request, body: &mut dyn BodyReader) -> Flow {
        if !request.method.carries_body() {
            return Flow::Continue;
        }

        if !is_json_media_type(request.header("content-type").unwrap_or_default()) {
            return Self::reject(body, 400, MSG_INVALID_CONTENT_TYPE);
        }

        let content_len = request
            .header("content-length")
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|len| *len > 0);
        let Some(content_len) = content_len else {
            return Self::reject(body, 400, MSG_MISSING_CONTENT_LENGTH);
        };

        if content_len > self.max_len {
            return Self::reject(body, 413, MSG_PAYLOAD_TOO_LARGE);
        }

        let bytes = match body.read_exact(content_len) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!("{err}");
                return Self::reject(body, 400, MSG_INCOMPLETE_BODY);
            }
        };

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(value) => request.json = Some(value),
            Err(err) => {
                warn!("json decode failed: {err}");
                return Flow::Respond(Response::error(400, MSG_MALFORMED_JSON));
            }
        }

        request.body = Some(bytes);
        Flow::Continue
    }
}

fn is_json_media_type(value: &str) -> bool {
    let essence = value.split(';').next().unwrap_or_default().trim();
    essence.eq_ignore_ascii_case(JSON_CONTENT_TYPE)
}

#[derive(Default)]
pub struct Chain {
    stages: Vec<Box<dyn Middleware>>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn standard() -> Self {
        Self::new()
            .with(LogRequest)
            .with(MethodGuard)
            .with(JsonBody::default())
    }

    pub fn with(mut self, stage: impl Middleware + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    fn run(&self, route: &Route, request: &mut Request, body: &mut dyn BodyReader) -> Response {
        for stage in &self.stages {
            if let Flow::Respond(response) = stage.handle(route, request, body) {
                return response;
            }
        }

        (route.handler)(&*request)
    }
}

pub struct Dispatcher {
    routes: Vec<Route>,
    chain: Chain,
}

impl Dispatcher {
    pub fn new(chain: Chain) -> Self {
        Self {
            routes: Vec::new(),
            chain,
        }
    }

    pub fn route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    pub fn dispatch(&self, mut request: Request, body: &mut dyn BodyReader) -> Response {
        let response = match self.routes.iter().find(|route| route.path() == request.path) {
            Some(route) => self.chain.run(route, &mut request, body),
            None => {
                info!("{} {}", request.method.as_str(), request.path);
                body.drain();
                Response::error(404, MSG_NOT_FOUND)
            }
        };

        debug!("{} {} {}", response.status_line(), request.method.as_str(), request.path);
        response
    }
}
