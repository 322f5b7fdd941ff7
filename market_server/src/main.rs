use log::*;
use market_server::{config::ServerConfig, server::run_server};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();
    let config = ServerConfig::from_env_or_default();
    info!("🚀️ Starting marketplace server on {}:{}", config.host, config.port);
    match run_server(config).await {
        Ok(_) => info!("🚀️ Server shut down gracefully."),
        Err(e) => error!("🚀️ Server stopped with error: {e}"),
    }
    Ok(())
}
