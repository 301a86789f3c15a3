//! CLI entry point for colloquy.

mod cli;

use clap::Parser;
use colloquy::api::http::HttpTransport;
use colloquy::app::App;
use colloquy::config::load_config;
use colloquy::render::TerminalRenderer;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let args = cli::Args::parse();

    // Diagnostics go to stderr so they never interleave with transcript
    // output on stdout. Silent unless RUST_LOG asks for more.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = match load_config(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    // Apply CLI overrides.
    if let Some(url) = &args.backend_url {
        config.backend.base_url = url.clone();
    }
    if args.no_color {
        config.display.color = false;
    }

    let transport = Arc::new(HttpTransport::new(&config.backend));
    let renderer = Box::new(TerminalRenderer::new(&config.display));
    let mut app = App::new(transport, &config, renderer);

    match args.prompt {
        Some(prompt) => app.run_once(&prompt).await,
        None => app.run().await,
    }
}
