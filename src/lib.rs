//! Prerendering engine for crawler-safe static HTML
//!
//! Loads a dynamic (client-side-executed) page in a shared headless Chrome
//! instance, waits for the page's own rendering to settle, strips executable
//! content, and returns the final markup with a derived status code. The
//! intended consumer is a bot/crawler proxy: crawlers that cannot run page
//! scripts get served the captured static document instead.
//!
//! # Target-page protocol
//!
//! Pages may opt into the handshake via meta tags, all optional:
//!
//! - `<meta name="render:wait" content="true">` asks the engine to block
//!   until a rendered-signal appears before capturing output.
//! - `<meta name="render:rendered">` signals that rendering is complete;
//!   only its presence matters, not its content.
//! - `<meta name="render:status_code" content="404">` declares a logical
//!   status code, honored only when the transport status was 200 (or a 304
//!   normalized to 200).
//!
//! # Example
//!
//! ```no_run
//! use prerender::{PreRenderer, Viewport};
//!
//! # fn main() -> prerender::Result<()> {
//! let renderer = PreRenderer::launch(Viewport::default(), false)?;
//! let result = renderer.render("https://example.com", None);
//! println!("{} ({} bytes)", result.status_code, result.content.len());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub use error::{Error, Result};

// Render engine over the Chrome DevTools Protocol
pub mod cdp;

// Async-friendly facade over the synchronous engine
pub mod async_api;

// HTTP gateway (route table, health check, render route)
pub mod server;

pub use async_api::RenderHandle;
pub use cdp::PreRenderer;
pub use server::Gateway;

/// Meta tag a page sets to request the engine block for a rendered-signal
pub const META_WAIT: &str = "render:wait";

/// Meta tag whose presence signals that the page has finished rendering
pub const META_RENDERED: &str = "render:rendered";

/// Meta tag a page sets to declare a logical HTTP status code
pub const META_STATUS_CODE: &str = "render:status_code";

/// Configuration for a single render call
///
/// Options are immutable for the duration of one call; concurrent renders
/// never share mutable option state.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Ceiling in milliseconds for navigation and for the optional ready-wait
    pub timeout_ms: u64,
    /// Viewport dimensions (never mobile-emulated)
    pub viewport: Viewport,
    /// Force the custom-elements polyfill in the target page
    pub force_polyfill: bool,
    /// Force shadow-DOM shimming in the target page
    pub shim_dom: bool,
    /// Force CSS-custom-property shimming in the target page
    pub shim_css_properties: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 15_000,
            viewport: Viewport::default(),
            force_polyfill: true,
            shim_dom: true,
            shim_css_properties: true,
        }
    }
}

/// Viewport dimensions
#[derive(Debug, Clone, Copy)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1000,
            height: 1000,
        }
    }
}

/// Outcome of one render call: a status code and the captured markup
///
/// There are exactly two shapes: the bad-request value (400, empty content)
/// that every failure collapses to, and a success value carrying the derived
/// status code and the sanitized serialized document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderResult {
    pub status_code: u16,
    pub content: String,
}

impl RenderResult {
    /// The canonical failure value: status 400, empty content
    pub fn bad_request() -> Self {
        Self {
            status_code: 400,
            content: String::new(),
        }
    }

    /// A successful capture with its derived status code
    pub fn ok(status_code: u16, content: String) -> Self {
        Self {
            status_code,
            content,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options() {
        let options = RenderOptions::default();
        assert_eq!(options.timeout_ms, 15_000);
        assert_eq!(options.viewport.width, 1000);
        assert_eq!(options.viewport.height, 1000);
        assert!(options.force_polyfill);
        assert!(options.shim_dom);
        assert!(options.shim_css_properties);
    }

    #[test]
    fn bad_request_shape() {
        let result = RenderResult::bad_request();
        assert_eq!(result.status_code, 400);
        assert!(result.content.is_empty());
    }

    #[test]
    fn ok_carries_derived_status() {
        let result = RenderResult::ok(404, "<html></html>".to_string());
        assert_eq!(result.status_code, 404);
        assert_eq!(result.content, "<html></html>");
    }
}
