use medilens_service::{ServiceConfig, create_app, logging::init_tracing};
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    info!(?config, "Configuration loaded");

    let app = create_app(&config).await?;
    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    let addr = listener.local_addr()?;

    info!("MediLens Diagnostic Service starting on {}", addr);
    info!("API description available at http://{}/", addr);
    info!("Health check endpoint: http://{}/health", addr);
    info!("Diagnosis endpoint: POST http://{}/diagnose", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
