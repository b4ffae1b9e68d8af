use argh::FromArgs;
use fitting_room::{
    FittingConfig, GeminiEditor, OverlayComposer, TryOnEngine, UploadStore, server,
    storage::spawn_retention_sweeper,
};
use std::sync::Arc;

#[derive(FromArgs)]
/// Fitting room is a virtual try-on server.
struct FittingArgs {
    /// the host to run the server on, overrides HOST
    #[argh(option)]
    host: Option<String>,

    /// the port to run the server on, overrides PORT
    #[argh(option, short = 'p')]
    port: Option<u16>,

    /// command to execute: "serve" (default) or "models"
    #[argh(subcommand)]
    command: Option<FittingCommands>,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum FittingCommands {
    Serve(ServeCommand),
    Models(ModelsCommand),
}

#[derive(FromArgs)]
/// Run the HTTP server
#[argh(subcommand, name = "serve")]
struct ServeCommand {}

#[derive(FromArgs)]
/// List the Gemini models usable with the configured key
#[argh(subcommand, name = "models")]
struct ModelsCommand {}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // a missing .env file is fine
    let _ = dotenv::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args: FittingArgs = argh::from_env();

    let mut config = FittingConfig::from_env()?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    match args.command {
        Some(FittingCommands::Models(_)) => list_models(&config).await,
        Some(FittingCommands::Serve(_)) | None => serve(config).await,
    }
}

async fn serve(config: FittingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = UploadStore::open(&config.upload_dir).await?;
    let composer = OverlayComposer::from_config(&config)?;

    let editor = GeminiEditor::from_config(&config);
    match &editor {
        Some(editor) => log::info!("✨ Remote editing enabled with {}", editor.model()),
        None => log::warn!("⚠️ No API key found. Using offline simulation (overlay)."),
    }

    if let Some(retention) = config.upload_retention {
        log::info!("Sweeping uploads older than {retention:?} every {:?}", config.sweep_interval);
        spawn_retention_sweeper(store.clone(), retention, config.sweep_interval);
    }

    let engine = Arc::new(TryOnEngine::new(editor, composer, store, &config));
    let app = server::router(engine, config.max_upload_bytes);

    let addr = config.bind_addr();
    log::info!("🚀 Starting the server");
    log::info!("🔥 Listening on: {}", addr);
    log::info!("🔧 Press Ctrl+C to stop the server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn list_models(config: &FittingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let Some(editor) = GeminiEditor::from_config(config) else {
        return Err("GEMINI_API_KEY is not set".into());
    };

    let models = editor.list_models().await?;
    if models.is_empty() {
        println!("No generateContent models available for this key");
    }
    for model in models {
        println!(
            " - {} (Version: {})",
            model.name,
            model.version.as_deref().unwrap_or("unknown")
        );
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl+C: {err}");
        std::future::pending::<()>().await;
    }
    log::info!("Shutting down");
}
