//! Chrome DevTools Protocol render engine implementation
//!
//! Owns a long-lived browser handle and renders one URL per call inside an
//! ephemeral, exclusively-owned tab. The tab is the only stateful resource
//! with an explicit lifecycle here; a drop guard closes it on every exit
//! path, so each call opens exactly one page context and closes exactly one.

use crate::{
    Error, RenderOptions, RenderResult, Result, Viewport, META_RENDERED, META_STATUS_CODE,
    META_WAIT,
};
use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::types::Event;
use headless_chrome::protocol::cdp::Emulation;
use headless_chrome::protocol::cdp::Network::{self, ResourceType};
use headless_chrome::protocol::cdp::Page;
use headless_chrome::{Browser, LaunchOptions};
use log::{debug, error, warn};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// How long the network must stay quiet before navigation counts as settled
const NETWORK_IDLE_WINDOW: Duration = Duration::from_millis(500);

/// Poll interval for the network-idle check
const NETWORK_IDLE_POLL: Duration = Duration::from_millis(50);

/// Selector matching every element stripped from the captured document:
/// untyped scripts, javascript-typed scripts, and legacy HTML imports.
const STRIP_SELECTOR: &str = r#"script:not([type]), script[type*="javascript"], link[rel=import]"#;

/// Render engine backed by a shared headless Chrome instance
///
/// The browser handle is process-wide state: launch it once at startup and
/// share the renderer across requests. After construction the handle is only
/// used to spawn new tabs, so concurrent renders never contend on it.
#[derive(Clone)]
pub struct PreRenderer {
    browser: Browser,
}

impl PreRenderer {
    /// Wraps an already-launched browser (dependency injection; the caller
    /// owns the browser lifecycle).
    pub fn new(browser: Browser) -> Self {
        Self { browser }
    }

    /// Launches a dedicated headless Chrome and wraps it.
    ///
    /// `sandbox: false` maps to Chrome's `--no-sandbox`, which container
    /// deployments usually require.
    pub fn launch(viewport: Viewport, sandbox: bool) -> Result<Self> {
        let launch_options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(sandbox)
            .window_size(Some((viewport.width, viewport.height)))
            .build()
            .map_err(|e| Error::InitializationError(format!("Failed to build launch options: {e}")))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| Error::InitializationError(format!("Failed to launch browser: {e}")))?;

        Ok(Self::new(browser))
    }

    /// Renders `url` to its final static markup.
    ///
    /// Never returns an error: every failure path resolves to
    /// `RenderResult::bad_request()` after writing a diagnostic log entry.
    /// Callers cannot distinguish a navigation failure from any other
    /// exception without the logs.
    pub fn render(&self, url: &str, options: Option<RenderOptions>) -> RenderResult {
        let options = options.unwrap_or_default();
        match self.render_page(url, &options) {
            Ok(result) => result,
            Err(err) => {
                error!("render of {url} failed: {err}");
                RenderResult::bad_request()
            }
        }
    }

    fn render_page(&self, url: &str, options: &RenderOptions) -> Result<RenderResult> {
        let tab = self.browser.new_tab()?;
        let _guard = PageGuard { tab: tab.clone() };

        let timeout = Duration::from_millis(options.timeout_ms);
        tab.set_default_timeout(timeout);

        self.configure_viewport(&tab, options.viewport)?;
        self.inject_shims(&tab, options)?;

        let watch = NetworkWatch::attach(&tab)?;
        let deadline = Instant::now() + timeout;

        tab.navigate_to(url)
            .map_err(|e| Error::NavigationError(e.to_string()))?;
        tab.wait_until_navigated()
            .map_err(|e| Error::NavigationError(e.to_string()))?;
        watch.wait_until_idle(deadline, options.timeout_ms)?;

        let transport_status = watch.document_status().ok_or(Error::MissingResponse)?;

        if self.wants_ready_wait(&tab) {
            // Advisory wait: the page asked us to hold for its rendered
            // signal, but a timeout here is a normal outcome and the capture
            // proceeds with whatever state exists.
            let selector = format!(r#"meta[name="{META_RENDERED}"]"#);
            if tab
                .wait_for_element_with_custom_timeout(&selector, timeout)
                .is_err()
            {
                debug!("ready-wait for {url} elapsed without a rendered signal");
            }
        }

        let status_code = resolve_status(transport_status, self.declared_status(&tab));

        self.strip_active_content(&tab)?;
        let content = self.serialize_document(&tab)?;

        Ok(RenderResult::ok(status_code, content))
    }

    /// Applies the viewport for this render only. Never mobile-emulated.
    fn configure_viewport(&self, tab: &Tab, viewport: Viewport) -> Result<()> {
        tab.call_method(Emulation::SetDeviceMetricsOverride {
            width: viewport.width,
            height: viewport.height,
            device_scale_factor: 1.0,
            mobile: false,
            scale: None,
            screen_width: None,
            screen_height: None,
            position_x: None,
            position_y: None,
            dont_set_visible_size: None,
            screen_orientation: None,
            viewport: None,
            display_feature: None,
            device_posture: None,
        })?;
        Ok(())
    }

    /// Injects the three shim flags the target page's polyfill runtime reads
    /// before any of its own scripts execute. The injections are independent;
    /// order does not matter.
    fn inject_shims(&self, tab: &Tab, options: &RenderOptions) -> Result<()> {
        self.evaluate_on_new_document(
            tab,
            format!("customElements.forcePolyfill = {};", options.force_polyfill),
        )?;
        self.evaluate_on_new_document(tab, format!("ShadyDOM = {{force: {}}};", options.shim_dom))?;
        self.evaluate_on_new_document(
            tab,
            format!(
                "ShadyCSS = {{shimcssproperties: {}}};",
                options.shim_css_properties
            ),
        )?;
        Ok(())
    }

    fn evaluate_on_new_document(&self, tab: &Tab, source: String) -> Result<()> {
        tab.call_method(Page::AddScriptToEvaluateOnNewDocument {
            source,
            world_name: None,
            include_command_line_api: None,
            run_immediately: None,
        })?;
        Ok(())
    }

    /// Reads the content attribute of a named meta tag on the rendered page.
    /// Absence of the tag (or a failed lookup) is a normal outcome, never an
    /// error.
    fn meta_content(&self, tab: &Tab, name: &str) -> Option<String> {
        let expr = format!(
            r#"(function() {{
                const el = document.querySelector('meta[name="{name}"]');
                return el ? (el.getAttribute('content') || '') : null;
            }})()"#
        );
        let value = tab.evaluate(&expr, false).ok()?.value?;
        value.as_str().map(|s| s.to_string())
    }

    fn wants_ready_wait(&self, tab: &Tab) -> bool {
        self.meta_content(tab, META_WAIT).as_deref() == Some("true")
    }

    fn declared_status(&self, tab: &Tab) -> Option<u16> {
        parse_status_meta(self.meta_content(tab, META_STATUS_CODE).as_deref())
    }

    /// Removes executable content from the live document so the captured
    /// markup cannot re-run client logic when served statically. Runs as an
    /// injected evaluation; the document is never manipulated in-process.
    fn strip_active_content(&self, tab: &Tab) -> Result<()> {
        let expr = format!(
            r#"(function() {{
                const elements = document.querySelectorAll('{STRIP_SELECTOR}');
                for (const el of Array.from(elements)) {{
                    el.remove();
                }}
            }})()"#
        );
        tab.evaluate(&expr, false)
            .map_err(|e| Error::ScriptError(e.to_string()))?;
        Ok(())
    }

    /// Serializes the root element's outer markup as it currently stands.
    fn serialize_document(&self, tab: &Tab) -> Result<String> {
        let result = tab
            .evaluate("document.firstElementChild.outerHTML", false)
            .map_err(|e| Error::ScriptError(e.to_string()))?;

        match result.value {
            Some(serde_json::Value::String(html)) => Ok(html),
            other => Err(Error::ScriptError(format!(
                "document serialization returned a non-string value: {other:?}"
            ))),
        }
    }
}

/// Closes the tab exactly once when the render call exits, on every path.
struct PageGuard {
    tab: Arc<Tab>,
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        if let Err(err) = self.tab.close(false) {
            warn!("failed to close page context: {err}");
        }
    }
}

struct WatchState {
    inflight: HashSet<String>,
    last_activity: Instant,
    document_status: Option<u16>,
}

/// Tracks in-flight requests on one tab to implement the idle-network
/// navigation condition, and records the transport status of the first
/// document response (the main document, pre-iframe).
struct NetworkWatch {
    state: Arc<Mutex<WatchState>>,
}

impl NetworkWatch {
    fn attach(tab: &Arc<Tab>) -> Result<Self> {
        tab.call_method(Network::Enable {
            max_total_buffer_size: None,
            max_resource_buffer_size: None,
            max_post_data_size: None,
            enable_durable_messages: None,
            report_direct_socket_traffic: None,
        })?;

        let state = Arc::new(Mutex::new(WatchState {
            inflight: HashSet::new(),
            last_activity: Instant::now(),
            document_status: None,
        }));

        let shared = state.clone();
        tab.add_event_listener(Arc::new(move |event: &Event| {
            let mut state = match shared.lock() {
                Ok(state) => state,
                Err(_) => return,
            };
            match event {
                Event::NetworkRequestWillBeSent(e) => {
                    state.inflight.insert(e.params.request_id.clone());
                    state.last_activity = Instant::now();
                }
                Event::NetworkLoadingFinished(e) => {
                    state.inflight.remove(&e.params.request_id);
                    state.last_activity = Instant::now();
                }
                Event::NetworkLoadingFailed(e) => {
                    state.inflight.remove(&e.params.request_id);
                    state.last_activity = Instant::now();
                }
                Event::NetworkResponseReceived(e) => {
                    if state.document_status.is_none()
                        && matches!(e.params.Type, ResourceType::Document)
                    {
                        state.document_status = Some(e.params.response.status as u16);
                    }
                    state.last_activity = Instant::now();
                }
                _ => {}
            }
        }))?;

        Ok(Self { state })
    }

    /// Blocks until no requests are in flight for a full settling window, or
    /// fails with `Error::Timeout` once the deadline passes. A page that
    /// never goes quiet is a navigation failure, same as a page that never
    /// loads.
    fn wait_until_idle(&self, deadline: Instant, timeout_ms: u64) -> Result<()> {
        loop {
            {
                let state = self
                    .state
                    .lock()
                    .map_err(|_| Error::CdpError("network watch lock poisoned".to_string()))?;
                if state.inflight.is_empty() && state.last_activity.elapsed() >= NETWORK_IDLE_WINDOW
                {
                    return Ok(());
                }
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout(timeout_ms));
            }
            std::thread::sleep(NETWORK_IDLE_POLL);
        }
    }

    fn document_status(&self) -> Option<u16> {
        self.state.lock().ok().and_then(|s| s.document_status)
    }
}

/// Derives the reported status code from the transport status and the page's
/// declared override. 304 normalizes to 200 first; the override only takes
/// effect when the normalized status is exactly 200, so a page can never use
/// the meta tag to mask a real server error or replace an already-custom
/// status.
fn resolve_status(transport: u16, declared: Option<u16>) -> u16 {
    let normalized = if transport == 304 { 200 } else { transport };
    match declared {
        Some(code) if normalized == 200 => code,
        _ => normalized,
    }
}

/// Parses the `render:status_code` meta content. Missing, non-integer, and
/// zero values are all swallowed; the transport status stands.
fn parse_status_meta(content: Option<&str>) -> Option<u16> {
    let code = content?.trim().parse::<u16>().ok()?;
    (code != 0).then_some(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_200_stands() {
        assert_eq!(resolve_status(200, None), 200);
    }

    #[test]
    fn not_modified_normalizes_to_200() {
        assert_eq!(resolve_status(304, None), 200);
    }

    #[test]
    fn declared_status_overrides_200() {
        assert_eq!(resolve_status(200, Some(404)), 404);
    }

    #[test]
    fn declared_status_overrides_normalized_304() {
        assert_eq!(resolve_status(304, Some(404)), 404);
    }

    #[test]
    fn declared_status_never_masks_server_error() {
        assert_eq!(resolve_status(500, Some(404)), 500);
        assert_eq!(resolve_status(404, Some(200)), 404);
    }

    #[test]
    fn redirect_status_is_not_overridden() {
        assert_eq!(resolve_status(302, Some(404)), 302);
    }

    #[test]
    fn status_meta_parses_plain_integers() {
        assert_eq!(parse_status_meta(Some("404")), Some(404));
        assert_eq!(parse_status_meta(Some(" 410 ")), Some(410));
    }

    #[test]
    fn status_meta_swallows_garbage() {
        assert_eq!(parse_status_meta(None), None);
        assert_eq!(parse_status_meta(Some("")), None);
        assert_eq!(parse_status_meta(Some("not-a-code")), None);
        assert_eq!(parse_status_meta(Some("-1")), None);
        assert_eq!(parse_status_meta(Some("0")), None);
    }

    #[test]
    fn strip_selector_covers_the_documented_elements() {
        assert!(STRIP_SELECTOR.contains("script:not([type])"));
        assert!(STRIP_SELECTOR.contains(r#"script[type*="javascript"]"#));
        assert!(STRIP_SELECTOR.contains("link[rel=import]"));
    }
}
