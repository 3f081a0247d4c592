//! End-to-end tests for the HTTP gateway
//!
//! Boots the real gateway in a background thread and speaks plain HTTP/1.1
//! over a TcpStream. Chrome is required, so everything here is `#[ignore]`d.

use prerender::{Gateway, PreRenderer, RenderOptions, Viewport};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Once;
use std::time::Duration;
use tiny_http::{Response, Server};

const GATEWAY_PORT: u16 = 18092;
const FIXTURE_PORT: u16 = 18093;

static INIT: Once = Once::new();

/// Boot the fixture page server and the gateway under test, once.
fn start_stack() {
    INIT.call_once(|| {
        std::thread::spawn(|| {
            let server = Server::http(("127.0.0.1", FIXTURE_PORT)).unwrap();
            for request in server.incoming_requests() {
                let page = r#"<!DOCTYPE html>
<html>
<head><title>Gateway Fixture</title></head>
<body><h1>Served through the gateway</h1></body>
</html>"#;
                let response = Response::from_string(page).with_header(
                    "Content-Type: text/html; charset=utf-8"
                        .parse::<tiny_http::Header>()
                        .unwrap(),
                );
                let _ = request.respond(response);
            }
        });

        std::thread::spawn(|| {
            let renderer = PreRenderer::launch(Viewport::default(), false)
                .expect("Failed to launch browser");
            let options = RenderOptions {
                timeout_ms: 10_000,
                ..RenderOptions::default()
            };
            Gateway::new(renderer, options, GATEWAY_PORT)
                .run()
                .expect("gateway stopped");
        });

        // Wait for the gateway socket to come up
        for _ in 0..50 {
            if TcpStream::connect(("127.0.0.1", GATEWAY_PORT)).is_ok() {
                return;
            }
            std::thread::sleep(Duration::from_millis(100));
        }
        panic!("gateway did not start listening");
    });
}

fn http_get(path: &str) -> String {
    let mut stream = TcpStream::connect(("127.0.0.1", GATEWAY_PORT)).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(30)))
        .unwrap();
    write!(
        stream,
        "GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"
    )
    .unwrap();
    let mut body = String::new();
    stream.read_to_string(&mut body).unwrap();
    body
}

#[test]
#[ignore] // Requires Chrome to be installed
fn health_check_answers_ok() {
    start_stack();
    let response = http_get("/_ah/health");
    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.ends_with("OK"));
}

#[test]
#[ignore] // Requires Chrome to be installed
fn render_route_marks_and_serves_the_capture() {
    start_stack();
    let response = http_get(&format!("/render/http://127.0.0.1:{FIXTURE_PORT}/"));
    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.to_ascii_lowercase().contains("x-renderer: prerender"));
    assert!(response.contains("Served through the gateway"));
    // Executable content never leaves the gateway
    assert!(!response.contains("<script>"));
}

#[test]
#[ignore] // Requires Chrome to be installed
fn escaped_target_is_decoded_and_served() {
    start_stack();
    let response = http_get(&format!(
        "/render/http%3A%2F%2F127.0.0.1%3A{FIXTURE_PORT}%2F"
    ));
    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains("Served through the gateway"));
}

#[test]
#[ignore] // Requires Chrome to be installed
fn invalid_target_is_a_bad_request() {
    start_stack();
    let response = http_get("/render/not-an-absolute-url");
    assert!(response.starts_with("HTTP/1.1 400"));
}

#[test]
#[ignore] // Requires Chrome to be installed
fn unknown_route_is_not_found() {
    start_stack();
    let response = http_get("/unknown");
    assert!(response.starts_with("HTTP/1.1 404"));
}
