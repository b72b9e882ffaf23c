use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ocrgate::api::{create_router, AppState};
use ocrgate::config::Config;
use ocrgate::ocr::{tesseract_language, OcrEngine, OcrProvider};

#[derive(Parser)]
#[command(name = "ocrgate")]
#[command(about = "HTTP gateway that runs OCR over images sent in any common encoding")]
struct Args {
    /// Listen host (overrides OCRGATE_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Listen port (overrides OCRGATE_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// OCR language code, e.g. `en` or `ch` (overrides OCR_LANGUAGE)
    #[arg(long)]
    lang: Option<String>,

    /// Directory holding the recognition models (overrides OCR_MODEL_DIR)
    #[arg(long)]
    model_dir: Option<PathBuf>,
}

impl Args {
    fn apply(self, config: &mut Config) {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(lang) = self.lang {
            config.ocr.language = lang;
        }
        if let Some(dir) = self.model_dir {
            config.ocr.model_dir = Some(dir);
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ocrgate=info,tower_http=info".into());

    let json = std::env::var("OCRGATE_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    dotenvy::dotenv().ok();
    init_tracing();

    let mut config = Config::from_env();
    args.apply(&mut config);
    config.ocr.model_dir = config.ocr.resolve_model_dir()?;

    tracing::info!(
        "Initializing OCR engine: {} (language={}, tesseract={})...",
        config.ocr.model,
        config.ocr.language,
        tesseract_language(&config.ocr.language)
    );
    let engine: Arc<dyn OcrEngine> = match OcrProvider::new(&config.ocr) {
        Ok(provider) => Arc::new(provider),
        Err(e) => {
            tracing::error!("Failed to initialize OCR engine: {}", e);
            std::process::exit(1);
        }
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let model_dir = config
        .ocr
        .model_dir
        .as_ref()
        .map(|d| d.display().to_string())
        .unwrap_or_else(|| "<engine default>".to_string());

    let state = AppState::new(config, engine);
    let app = create_router(state);

    tracing::info!("ocrgate starting on http://{}", addr);
    tracing::info!("  OCR endpoint: http://{}/ocr", addr);
    tracing::info!("  Health check: http://{}/health", addr);
    tracing::info!("  Model dir:    {}", model_dir);

    let cancel_token = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel_token.clone()));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(cancel_token.cancelled_owned())
        .await?;

    tracing::info!("ocrgate stopped");
    Ok(())
}

async fn shutdown_signal(cancel_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining in-flight requests...");
    cancel_token.cancel();
}
