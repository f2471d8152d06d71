//! solver-web - HTTP surface for the Proposer/Skeptic verification loop.

mod routes;
mod sse;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use axum::Router;
use axum::routing::get;
use clap::Parser;
use solver::io::config::load_config;
use solver::io::credentials::load_credentials;
use solver::io::init::SolverPaths;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::info;

use crate::state::AppState;

#[derive(Parser)]
#[command(name = "solver-web")]
#[command(about = "HTTP API for solving and browsing verified problems")]
struct Args {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on
    #[arg(long, default_value = "3001")]
    port: u16,

    /// Directory holding `config.toml` and saved records
    #[arg(long, default_value = ".solver")]
    data_dir: PathBuf,

    /// Directory containing UI static files (defaults to ./ui/dist)
    #[arg(long)]
    ui_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("solver_web=info".parse()?)
                .add_directive("solver=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let paths = SolverPaths::new(&args.data_dir);
    let config = load_config(&paths.config_path)?;
    let credentials = load_credentials(&config.credentials.env_vars)
        .context("solver-web needs at least one credential set")?;
    info!(
        data_dir = %paths.data_dir.display(),
        credentials = credentials.len(),
        model = %config.llm.model,
        "starting solver-web"
    );

    let factory = AppState::http_client_factory(&config);
    let state = AppState::new(paths, config, credentials, factory);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new()
        .nest("/api", routes::api_router())
        .route("/events", get(sse::events_handler))
        .layer(cors)
        .with_state(state);

    let ui_dir = args.ui_dir.unwrap_or_else(|| PathBuf::from("ui").join("dist"));
    if ui_dir.exists() {
        info!(ui_dir = %ui_dir.display(), "serving static UI files");
        app = app.fallback_service(ServeDir::new(ui_dir).append_index_html_on_directories(true));
    } else {
        info!(ui_dir = %ui_dir.display(), "UI directory not found, API-only mode");
    }

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
