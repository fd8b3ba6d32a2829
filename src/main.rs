use realtime_messaging_service::config::Config;
use realtime_messaging_service::error::{AppError, AppResult};
use realtime_messaging_service::routes::create_router;
use realtime_messaging_service::state::AppState;
use realtime_messaging_service::{db, logging, migrations};

#[tokio::main]
async fn main() -> AppResult<()> {
    logging::init_tracing();

    let config = Config::from_env()?;

    let pool = db::init_pool(&config.database_url)
        .await
        .map_err(|e| AppError::StartServer(format!("database connection failed: {e}")))?;
    migrations::run_all(&pool).await?;

    let port = config.port;
    let state = AppState::new(pool, config);
    let app = create_router(state);

    let bind_addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| AppError::StartServer(format!("failed to bind {bind_addr}: {e}")))?;
    tracing::info!(%bind_addr, "realtime-messaging-service listening");

    axum::serve(listener, app)
        .await
        .map_err(|e| AppError::StartServer(e.to_string()))?;

    Ok(())
}
