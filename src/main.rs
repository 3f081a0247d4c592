use clap::Parser;
use log::error;
use prerender::{Gateway, PreRenderer, RenderOptions, Viewport};

/// Prerendering proxy: executes client-side pages in headless Chrome and
/// serves the resulting static HTML to crawlers.
#[derive(Parser, Debug)]
#[command(name = "prerender", version, about)]
struct Args {
    /// Port for the HTTP gateway
    #[arg(long, default_value_t = 3000)]
    port: u16,

    /// Ceiling in milliseconds for navigation and the optional ready-wait
    #[arg(long, default_value_t = 15_000)]
    timeout_ms: u64,

    /// Viewport width in pixels
    #[arg(long, default_value_t = 1000)]
    width: u32,

    /// Viewport height in pixels
    #[arg(long, default_value_t = 1000)]
    height: u32,

    /// Keep the Chromium sandbox enabled (off by default; containers
    /// generally need --no-sandbox semantics)
    #[arg(long)]
    sandbox: bool,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let viewport = Viewport {
        width: args.width,
        height: args.height,
    };
    let options = RenderOptions {
        timeout_ms: args.timeout_ms,
        viewport,
        ..RenderOptions::default()
    };

    let renderer = match PreRenderer::launch(viewport, args.sandbox) {
        Ok(renderer) => renderer,
        Err(err) => {
            error!("failed to launch browser: {err}");
            std::process::exit(1);
        }
    };

    // Fail fast: a gateway that can no longer serve takes the process down
    // with it rather than limping along half-alive.
    if let Err(err) = Gateway::new(renderer, options, args.port).run() {
        error!("gateway terminated: {err}");
        std::process::exit(1);
    }
}
