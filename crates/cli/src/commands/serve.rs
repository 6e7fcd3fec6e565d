//! `tracefold serve`: start the HTTP gateway.

use tracefold_config::AppConfig;

pub async fn run(mut config: AppConfig, port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(port) = port {
        config.gateway.port = port;
    }
    config.validate()?;

    println!(
        "  tracefold gateway on http://{}:{}",
        config.gateway.host, config.gateway.port
    );
    println!("  Surfaces: POST /api/chat, /api/dev, /api/research");

    tracefold_gateway::start(config).await
}
