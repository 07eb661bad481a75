mod api;
mod db;
mod error;
mod models;
mod scheduler;
mod session;
mod srs;

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://memodeck.db?mode=rwc".into());
    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".into());

    let db = db::Db::connect(&database_url).await?;
    let state = api::ApiState { db };

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    log::info!("memodeck listening on {}", bind_addr);

    axum::serve(listener, api::app_router(state)).await?;

    Ok(())
}
