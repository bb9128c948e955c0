use std::sync::Arc;

use log::warn;
use serde_json::Value;

use crate::{
    device::{Coefficients, DeviceHandle, LightSetting},
    error::DeviceError,
    pipeline::{Body, Chain, Dispatcher, Method, Request, Response, Route},
    types::{CoefficientsView, HealthView, LightUpdated, LightView, MemoryState, READY_MESSAGE},
};

pub const MSG_DEVICE_UNAVAILABLE: &str = "device unavailable";

pub trait MemoryGauge: Send + Sync {
    fn free_bytes(&self) -> u64;
}

pub fn build_dispatcher(device: DeviceHandle, memory: Arc<dyn MemoryGauge>) -> Dispatcher {
    let coefficients_device = device.clone();
    let light_device = device;

    Dispatcher::new(Chain::standard())
        .route(Route::new("/healthz", &[Method::Get], move |_req: &Request| {
            healthz(memory.as_ref())
        }))
        .route(Route::new(
            "/coefficients",
            &[Method::Get, Method::Put],
            move |req: &Request| coefficients(&coefficients_device, req),
        ))
        .route(Route::new(
            "/light",
            &[Method::Get, Method::Put],
            move |req: &Request| light(&light_device, req),
        ))
}

fn healthz(memory: &dyn MemoryGauge) -> Response {
    Response::new(
        200,
        Body::json(&HealthView {
            message: READY_MESSAGE,
            state: MemoryState {
                free: memory.free_bytes(),
            },
            error: None,
        }),
    )
}

fn coefficients(device: &DeviceHandle, req: &Request) -> Response {
    if req.method != Method::Put {
        return match device.snapshot() {
            Ok(state) => {
                Response::new(200, Body::json(&CoefficientsView::from(state.coefficients)))
            }
            Err(err) => unavailable(err),
        };
    }

    let requested = match Coefficients::from_json(request_json(req)) {
        Ok(coefficients) => coefficients,
        Err(err) => return Response::error(400, &err.to_string()),
    };

    match device.set_coefficients(requested) {
        Ok(state) => Response::new(200, Body::json(&CoefficientsView::from(state.coefficients))),
        Err(err) => unavailable(err),
    }
}

fn light(device: &DeviceHandle, req: &Request) -> Response {
    if req.method != Method::Put {
        return match device.snapshot() {
            Ok(state) => Response::new(200, Body::json(&LightView::from(&state))),
            Err(err) => unavailable(err),
        };
    }

    let requested = match LightSetting::from_json(request_json(req)) {
        Ok(setting) => setting,
        Err(err) => return Response::error(400, &err.to_string()),
    };

    match device.set_light(requested) {
        Ok(state) => Response::new(200, Body::json(&LightUpdated::from(&state))),
        Err(err) => unavailable(err),
    }
}

fn request_json(req: &Request) -> &Value {
    req.json.as_ref().unwrap_or(&Value::Null)
}

fn unavailable(err: DeviceError) -> Response {
    warn!("{err}");
    Response::error(500, MSG_DEVICE_UNAVAILABLE)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        color::Rgb,
        device::{spawn_device_actor, tests::RecordingStrip, DeviceEngine},
        pipeline::BufferedBody,
    };

    struct FixedMemory(u64);

    impl MemoryGauge for FixedMemory {
        fn free_bytes(&self) -> u64 {
            self.0
        }
    }

    struct Harness {
        dispatcher: Dispatcher,
        strip: RecordingStrip,
    }

    impl Harness {
        fn new() -> Self {
            let strip = RecordingStrip::with_len(3);
            let device = spawn_device_actor(DeviceEngine::new(strip.clone())).unwrap();
            Self {
                dispatcher: build_dispatcher(device, Arc::new(FixedMemory(123_456))),
                strip,
            }
        }

        fn send(&self, request: Request, body: &str) -> (u16, String) {
            let response = self.dispatcher.dispatch(request, &mut BufferedBody::new(body));
            let text = String::from_utf8(response.body_bytes()).unwrap();
            (response.status, text)
        }

        fn get(&self, path: &str) -> (u16, String) {
            self.send(Request::new(Method::Get, path), "")
        }

        fn put_json(&self, path: &str, body: &str) -> (u16, String) {
            let request = Request::new(Method::Put, path)
                .with_header("Content-Type", "application/json")
                .with_header("Content-Length", &body.len().to_string());
            self.send(request, body)
        }
    }

    #[test]
    fn healthz_reports_free_memory() {
        let harness = Harness::new();

        assert_eq!(
            harness.get("/healthz"),
            (
                200,
                r#"{"message":"I'm as ready as I'll ever be!","state":{"free":123456},"error":null}"#
                    .to_string()
            )
        );
    }

    #[test]
    fn defaults_are_served_before_any_put() {
        let harness = Harness::new();

        assert_eq!(
            harness.get("/light"),
            (200, r#"{"temperature":4000,"brightness":255,"error":null}"#.to_string())
        );
        assert_eq!(
            harness.get("/coefficients"),
            (200, r#"{"r":1.0,"g":1.0,"b":1.0,"error":null}"#.to_string())
        );
        assert!(harness.strip.last_frame().is_none());
    }

    #[test]
    fn repeated_gets_are_identical() {
        let harness = Harness::new();
        harness.put_json("/coefficients", r#"{"r":0.5,"g":0.25,"b":1}"#);

        let first = harness.get("/coefficients");
        assert_eq!(first, harness.get("/coefficients"));
        assert_eq!(harness.get("/light"), harness.get("/light"));
    }

    #[test]
    fn light_put_round_trips() {
        let harness = Harness::new();

        let put = harness.put_json("/light", r#"{"temperature":4000,"brightness":128}"#);
        assert_eq!(
            put,
            (200, r#"{"brightness":128,"temperature":4000,"error":null}"#.to_string())
        );
        assert_eq!(
            harness.get("/light"),
            (200, r#"{"temperature":4000,"brightness":128,"error":null}"#.to_string())
        );
        assert_eq!(
            harness.strip.last_frame(),
            Some(vec![Rgb::new(128, 104, 81); 3])
        );
    }

    #[test]
    fn coefficients_put_applies_gain() {
        let harness = Harness::new();

        let put = harness.put_json("/coefficients", r#"{"r":0.5,"g":0,"b":1.0}"#);
        assert_eq!(put, (200, r#"{"r":0.5,"g":0.0,"b":1.0,"error":null}"#.to_string()));
        // 4000 K at full brightness is (255, 209, 163).
        assert_eq!(harness.strip.last_frame(), Some(vec![Rgb::new(127, 0, 163); 3]));
    }

    #[test]
    fn missing_r_wins_over_invalid_g_and_b() {
        let harness = Harness::new();

        assert_eq!(
            harness.put_json("/coefficients", r#"{"g":0.5,"b":0.5}"#),
            (400, r#"{"error":"bad request, request object has no r key"}"#.to_string())
        );
        assert_eq!(
            harness.put_json("/coefficients", r#"{"g":7,"b":-3}"#),
            (400, r#"{"error":"bad request, request object has no r key"}"#.to_string())
        );
    }

    #[test]
    fn off_grid_temperature_is_rejected_without_mutation() {
        let harness = Harness::new();

        assert_eq!(
            harness.put_json("/light", r#"{"temperature":4050,"brightness":100}"#),
            (400, r#"{"error":"bad request, invalid temperature"}"#.to_string())
        );
        assert_eq!(
            harness.put_json("/light", r#"{"temperature":4000,"brightness":300}"#),
            (400, r#"{"error":"bad request, invalid brightness"}"#.to_string())
        );
        assert_eq!(
            harness.get("/light"),
            (200, r#"{"temperature":4000,"brightness":255,"error":null}"#.to_string())
        );
        assert!(harness.strip.last_frame().is_none());
    }

    #[test]
    fn disallowed_methods_get_405() {
        let harness = Harness::new();

        for (method, path) in [
            (Method::Delete, "/healthz"),
            (Method::Put, "/healthz"),
            (Method::Post, "/light"),
            (Method::Patch, "/coefficients"),
            (Method::parse("get"), "/light"),
            (Method::parse("TRACE"), "/light"),
            (Method::parse("PROPFIND"), "/healthz"),
        ] {
            assert_eq!(
                harness.send(Request::new(method, path), "{}"),
                (405, r#"{"error":"method not allowed"}"#.to_string())
            );
        }
    }

    #[test]
    fn wrong_content_type_is_rejected_regardless_of_body() {
        let harness = Harness::new();
        let body = r#"{"temperature":4000,"brightness":128}"#;
        let request = Request::new(Method::Put, "/light")
            .with_header("Content-Type", "text/plain")
            .with_header("Content-Length", &body.len().to_string());

        assert_eq!(
            harness.send(request, body),
            (400, r#"{"error":"bad request, invalid content type"}"#.to_string())
        );
    }

    #[test]
    fn stopped_actor_yields_500() {
        let dispatcher = build_dispatcher(DeviceHandle::disconnected(), Arc::new(FixedMemory(0)));

        let response =
            dispatcher.dispatch(Request::new(Method::Get, "/light"), &mut BufferedBody::default());

        assert_eq!(response, Response::error(500, MSG_DEVICE_UNAVAILABLE));
    }
}
