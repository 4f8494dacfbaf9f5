mod config;
mod handlers;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use config::ServiceConfig;
use handlers::{AppState, SERVICE_NAME};
use tracing::info;
use tracing_subscriber::EnvFilter;
use wfruntime::{ActivityRegistry, DurableRuntime, OrchestratorRegistry};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting {}", SERVICE_NAME);
    info!(
        "Using Dapr ports - gRPC: {}, HTTP: {}",
        config.dapr_grpc_port, config.dapr_http_port
    );

    let mut activities = ActivityRegistry::new();
    wfactivities::register_all(&mut activities, config.activity_delay);

    let mut orchestrators = OrchestratorRegistry::new();
    wfactivities::register_workflows(&mut orchestrators, config.debug_mode);

    let runtime = DurableRuntime::with_config(activities, orchestrators, config.runtime_config());
    info!(
        "Runtime initialized (debug mode: {}, activity delay: {:?})",
        config.debug_mode, config.activity_delay
    );

    let app_state = web::Data::new(AppState {
        runtime: runtime.clone(),
    });

    info!("Server starting on http://{}:{}", config.host, config.port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(app_state.clone())
            .wrap(cors)
            .wrap(actix_web::middleware::Logger::default())
            .configure(handlers::configure)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await?;

    runtime.shutdown();
    info!("{} stopped", SERVICE_NAME);

    Ok(())
}
