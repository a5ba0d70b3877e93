use std::process::ExitCode;

use codegrant_server::ServerBuilder;
use codegrant_server::config::loader::load_config;
use codegrant_server::observability::init_tracing;

const DEFAULT_CONFIG: &str = "codegrant.toml";
const CONFIG_ENV: &str = "CODEGRANT_CONFIG";

#[tokio::main]
async fn main() -> ExitCode {
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(e) if e.not_found() => {}
        Err(e) => eprintln!("ignoring .env: {e}"),
    }

    let (config_path, origin) = config_path(std::env::args().skip(1));
    let cfg = match load_config(Some(&config_path)) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{config_path}: {e}");
            return ExitCode::from(2);
        }
    };

    // Nothing is logged before this point; config errors go to stderr.
    if let Err(e) = init_tracing(&cfg.logging) {
        eprintln!("{config_path}: {e}");
        return ExitCode::from(2);
    }
    tracing::info!(
        path = %config_path,
        origin,
        scheme = %cfg.oauth.scheme,
        client_id = %cfg.oauth.client_id,
        "Configuration loaded"
    );

    let server = match ServerBuilder::new(cfg).build() {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build the OAuth handler");
            return ExitCode::from(2);
        }
    };

    match server.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Server stopped");
            ExitCode::FAILURE
        }
    }
}

/// `--config <path>`, then `CODEGRANT_CONFIG`, then `codegrant.toml`.
fn config_path(mut args: impl Iterator<Item = String>) -> (String, &'static str) {
    while let Some(arg) = args.next() {
        if let Some(path) = arg.strip_prefix("--config=") {
            return (path.to_string(), "--config");
        }
        if arg == "--config" {
            if let Some(path) = args.next() {
                return (path, "--config");
            }
        }
    }
    match std::env::var(CONFIG_ENV) {
        Ok(path) if !path.is_empty() => (path, CONFIG_ENV),
        _ => (DEFAULT_CONFIG.to_string(), "default"),
    }
}
