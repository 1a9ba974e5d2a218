// querybuilder/src/main.rs
use actix_web::web;
use querybuilder::api::start_api_server;
use querybuilder::config::ApiConfig;
use querybuilder::context::AppContext;
use querybuilder::monitoring::{MonitoringConfig, MonitoringContext};

fn to_io_error(e: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();

    let monitoring = MonitoringContext::new(MonitoringConfig::from_env())?;

    let config = ApiConfig::from_env().map_err(to_io_error)?;
    config.log_env();

    let ctx = web::Data::new(AppContext::init(config).await.map_err(to_io_error)?);

    let server = start_api_server(ctx.clone())?;
    monitoring.startup_complete();
    let result = server.await;

    ctx.shutdown().await;
    result
}
