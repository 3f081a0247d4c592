//! Async-friendly facade over the synchronous render engine
//!
//! The CDP engine blocks its thread on protocol round-trips, so this facade
//! moves each render onto tokio's blocking pool and lets async callers await
//! the result. Every call still opens its own isolated page context; nothing
//! serializes concurrent renders behind a shared lock.

use crate::{PreRenderer, RenderOptions, RenderResult};
use log::error;

/// Cloneable async handle to a shared render engine
#[derive(Clone)]
pub struct RenderHandle {
    renderer: PreRenderer,
}

impl RenderHandle {
    pub fn new(renderer: PreRenderer) -> Self {
        Self { renderer }
    }

    /// Renders `url` on the blocking pool and awaits the outcome.
    ///
    /// Mirrors the engine contract: the returned future always resolves to a
    /// `RenderResult`, collapsing even a panicked render task into the
    /// bad-request value.
    pub async fn render(&self, url: &str, options: Option<RenderOptions>) -> RenderResult {
        let renderer = self.renderer.clone();
        let target = url.to_string();
        match tokio::task::spawn_blocking(move || renderer.render(&target, options)).await {
            Ok(result) => result,
            Err(err) => {
                error!("render task for {url} did not complete: {err}");
                RenderResult::bad_request()
            }
        }
    }
}
