use interview_scheduler::{
    config::{get_config, init_config},
    database::pool::{create_pool, run_migrations},
    routes, AppState,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info,sqlx=warn")),
        )
        .init();
    init_config()?;
    let config = get_config()?;

    let pool = create_pool().await?;
    run_migrations(&pool).await?;

    let app_state = AppState::new(pool, config)?;

    {
        let responses = app_state.responses.clone();
        let interval = config.expiry_sweep_interval;
        tokio::spawn(async move {
            loop {
                if let Err(e) = responses.sweep_expired().await {
                    tracing::error!(error = %e, "Interview expiry sweep failed");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    continue;
                }
                tokio::time::sleep(interval).await;
            }
        });
    }

    let app = routes::router(app_state);

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
