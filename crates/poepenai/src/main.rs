use anyhow::Context as _;
use clap::{CommandFactory, Parser};
use log::LevelFilter;
use poe_ox::Poe;
use poepenai::{
    AppState, LogRing,
    cli::{Cli, Command, ServerArgs},
    logging,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let Some(Command::Start(args)) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let ring = LogRing::new(args.log_buffer_size);
    let level = logging::parse_level(&cli.loglevel);
    logging::init(level.unwrap_or(LevelFilter::Info), ring.clone())
        .context("failed to install logger")?;
    if level.is_none() {
        log::error!(
            "Invalid log level specified, defaulting to INFO (specified_level: {})",
            cli.loglevel
        );
    }

    serve(args, ring).await
}

async fn serve(args: ServerArgs, ring: LogRing) -> anyhow::Result<()> {
    let poe = Poe::builder().base_url(args.poe_base_url.clone()).build();
    let state = AppState::new(poe, ring)
        .context("failed to compile logs page templates")?
        .with_conversation_id(&args.conversation_id)
        .with_request_timeout(args.request_timeout());

    let app = poepenai::app(state);

    let address = args.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    log::info!(
        "Starting Poe OpenAI Adapter server (address: {}, version: {})",
        listener.local_addr()?,
        env!("CARGO_PKG_VERSION")
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    log::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    log::info!("Shutdown signal received");
}
