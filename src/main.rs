use cinematch_api::config::Config;
use cinematch_api::routes::create_router;
use cinematch_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("cinematch_api=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;

    // Load the stores and the frozen model once; everything downstream
    // treats them as immutable shared state.
    let state = AppState::from_config(&config)?;

    let app = create_router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
