use actix_web::{web, App, HttpServer};
use actix_cors::Cors;
use dotenv::dotenv;
use lobby_server::{configure, AppError, AppState, Settings};
use lobby_server::config::CorsConfig;
use std::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn build_cors(config: &CorsConfig) -> Cors {
    if !config.enabled {
        // CORS disabled - use most restrictive settings
        return Cors::default();
    }

    let cors = if config.allow_any_origin {
        Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .expose_any_header()
            .supports_credentials()
    } else {
        config.allowed_origins.iter().fold(Cors::default(), |cors, origin| {
            cors.allowed_origin(origin)
        })
        .allowed_methods(vec!["GET"])
        .allowed_headers(vec!["Content-Type"])
        .supports_credentials()
    };

    cors.max_age(config.max_age as usize)
}

#[actix_web::main]
async fn main() -> lobby_server::Result<()> {
    dotenv().ok();

    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();

    let config = Settings::new()?;
    info!("Configuration loaded successfully ({})", config.environment);

    info!("Starting server at {}:{}", config.server.host, config.server.port);

    let state = AppState::new(config.clone());
    let data = web::Data::new(state.clone());

    let listener = TcpListener::bind(format!("{}:{}", config.server.host, config.server.port))?;

    info!(
        "Chat hub ready to accept connections at ws://{}/ws",
        listener.local_addr()?
    );

    let cors_config = config.cors.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(build_cors(&cors_config))
            .app_data(data.clone())
            .configure(configure)
    })
    .listen(listener)?
    .workers(config.server.workers as usize)
    .run()
    .await
    .map_err(|e| AppError::InternalError(e.to_string()))?;

    state.shutdown().await?;

    Ok(())
}
