//! HTTP gateway: maps inbound paths onto the render engine
//!
//! Thin glue by design. The route table knows three shapes: the health
//! check, the render route whose path remainder is the target URL, and
//! everything else (404). The engine's (status, content) pair is copied onto
//! the response unchanged, with a marker header identifying the proxy.

use crate::{Error, PreRenderer, RenderOptions, RenderResult, Result};
use log::{error, info};
use std::sync::Arc;
use std::thread;
use tiny_http::{Header, Request, Response, Server};
use url::Url;

const HEALTH_PATH: &str = "/_ah/health";
const RENDER_PREFIX: &str = "/render/";

/// HTTP front-end owning the listener and a shared render engine
pub struct Gateway {
    renderer: Arc<PreRenderer>,
    options: RenderOptions,
    port: u16,
}

/// Dispatch decision for one inbound request path
#[derive(Debug, Clone, PartialEq, Eq)]
enum Route {
    Health,
    Render(String),
    NotFound,
}

impl Gateway {
    pub fn new(renderer: PreRenderer, options: RenderOptions, port: u16) -> Self {
        Self {
            renderer: Arc::new(renderer),
            options,
            port,
        }
    }

    /// Serves until the listener fails. Each request runs on its own thread;
    /// concurrent renders share the browser but never a page context.
    ///
    /// Only returns on error, and the caller is expected to treat that as
    /// fatal for the whole process.
    pub fn run(&self) -> Result<()> {
        let server = Server::http(("0.0.0.0", self.port))
            .map_err(|e| Error::GatewayError(format!("failed to bind port {}: {e}", self.port)))?;
        info!("Listening on port {}", self.port);

        for request in server.incoming_requests() {
            let renderer = self.renderer.clone();
            let options = self.options.clone();
            thread::spawn(move || handle_request(renderer, options, request));
        }

        Err(Error::GatewayError("listener closed unexpectedly".to_string()))
    }
}

fn handle_request(renderer: Arc<PreRenderer>, options: RenderOptions, request: Request) {
    let raw_path = request.url().to_string();
    let method = request.method().to_string();

    let outcome = match route(&raw_path) {
        Route::Health => {
            info!("{method} {raw_path} -> 200");
            request.respond(Response::from_string("OK"))
        }
        Route::Render(target) => {
            let result = render_target(&renderer, options, &target);
            info!("{method} {raw_path} -> {}", result.status_code);
            request.respond(render_response(result))
        }
        Route::NotFound => {
            info!("{method} {raw_path} -> 404");
            request.respond(Response::from_string("Not Found").with_status_code(404))
        }
    };

    if let Err(err) = outcome {
        error!("failed to write response for {raw_path}: {err}");
    }
}

/// Splits an inbound path into its dispatch decision. The render target is
/// the raw path remainder, query string included, so callers can pass
/// unescaped URLs like `/render/https://example.com/page?a=b`.
fn route(raw_path: &str) -> Route {
    if raw_path == HEALTH_PATH {
        return Route::Health;
    }
    match raw_path.strip_prefix(RENDER_PREFIX) {
        Some(rest) if !rest.is_empty() => Route::Render(rest.to_string()),
        _ => Route::NotFound,
    }
}

fn render_target(renderer: &PreRenderer, options: RenderOptions, target: &str) -> RenderResult {
    // Reject targets that are not absolute URLs before spending a page
    // context on them; same external shape as a navigation failure.
    match normalize_target(target) {
        Some(url) => renderer.render(&url, Some(options)),
        None => {
            error!("rejecting render target that is not an absolute URL: {target}");
            RenderResult::bad_request()
        }
    }
}

/// Resolves the raw path remainder to an absolute URL. Clients may pass the
/// target unescaped (`/render/https://example.com`) or escaped
/// (`/render/https%3A%2F%2Fexample.com`); escaped targets are decoded once
/// before giving up.
fn normalize_target(target: &str) -> Option<String> {
    if Url::parse(target).is_ok() {
        return Some(target.to_string());
    }
    let decoded = percent_decode(target)?;
    Url::parse(&decoded).is_ok().then_some(decoded)
}

/// Percent-decode a path remainder without treating '+' specially.
fn percent_decode(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if i + 2 >= bytes.len() {
                return None;
            }
            let hi = (bytes[i + 1] as char).to_digit(16)?;
            let lo = (bytes[i + 2] as char).to_digit(16)?;
            out.push(((hi << 4) | lo) as u8);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

fn render_response(result: RenderResult) -> Response<std::io::Cursor<Vec<u8>>> {
    let mut response = Response::from_string(result.content).with_status_code(result.status_code);
    if let Ok(header) = Header::from_bytes(&b"x-renderer"[..], &b"prerender"[..]) {
        response.add_header(header);
    }
    if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], &b"text/html; charset=utf-8"[..]) {
        response.add_header(header);
    }
    response
}
