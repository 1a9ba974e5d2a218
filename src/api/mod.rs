use actix_cors::Cors;
use actix_web::dev::Server;
use actix_web::error::{InternalError, JsonPayloadError};
use actix_web::{web, App, Error, HttpRequest, HttpResponse, HttpServer};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::context::AppContext;
use crate::monitoring::metrics;
use crate::service::{RequestOptions, ServiceError};

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
    /// Overrides TOP_K when positive
    #[serde(default)]
    pub top_k: Option<i64>,
    /// `false` bypasses every cache layer for this request
    #[serde(default)]
    pub use_cache: Option<bool>,
}

#[derive(Serialize)]
struct CacheStatsResponse {
    request_id: String,
    enabled: bool,
    backend: &'static str,
    entries: Option<usize>,
    hits: u64,
    misses: u64,
    errors: u64,
    hit_rate: f64,
}

/// Generate a short request ID for correlation
fn generate_request_id() -> String {
    Uuid::new_v4().to_string()[..8].to_string()
}

fn service_error_response(request_id: &str, err: &ServiceError) -> HttpResponse {
    let body = json!({
        "error": err.to_string(),
        "request_id": request_id,
    });
    match err {
        ServiceError::InvalidRequest(_) => HttpResponse::BadRequest().json(body),
        ServiceError::Timeout { .. } => HttpResponse::GatewayTimeout().json(body),
        ServiceError::Upstream { .. } | ServiceError::InvalidModelOutput(_) => {
            HttpResponse::BadGateway().json(body)
        }
        ServiceError::VectorStore(_) | ServiceError::Cache(_) | ServiceError::Ingest(_) => {
            HttpResponse::InternalServerError().json(body)
        }
    }
}

/// Malformed or incomplete JSON bodies get the same error shape as the
/// handlers' own 400s.
fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> Error {
    let request_id = generate_request_id();
    warn!("[{}] Rejected request body: {}", request_id, err);
    let response =
        service_error_response(&request_id, &ServiceError::InvalidRequest(err.to_string()));
    InternalError::from_response(err, response).into()
}

async fn root_handler() -> Result<HttpResponse, Error> {
    Ok(HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body("RAG Query Builder API\n\nTry /health, POST /ingest or POST /report\n"))
}

pub async fn health_check(ctx: web::Data<AppContext>) -> Result<HttpResponse, Error> {
    let cache = ctx.service.cache();
    Ok(HttpResponse::Ok().json(json!({
        "status": "ok",
        "model": ctx.config.model,
        "embed_model": ctx.config.embed_model,
        "cache": {
            "enabled": cache.is_enabled(),
            "backend": cache.backend_kind().as_str(),
        },
        "timestamp": Utc::now().to_rfc3339(),
    })))
}

pub async fn ingest_handler(ctx: web::Data<AppContext>) -> Result<HttpResponse, Error> {
    let request_id = generate_request_id();
    match ctx.ingest().await {
        Ok(report) => {
            info!(
                "[{}] Ingest: {} files, {} chunks",
                request_id, report.files, report.chunks
            );
            Ok(HttpResponse::Ok().json(report))
        }
        Err(e) => {
            error!("[{}] Ingest failed: {}", request_id, e);
            Ok(service_error_response(&request_id, &e))
        }
    }
}

pub async fn report_handler(
    ctx: web::Data<AppContext>,
    req: web::Json<AskRequest>,
) -> Result<HttpResponse, Error> {
    let request_id = generate_request_id();
    let top_k = req.top_k.filter(|k| *k > 0).map(|k| k as usize);
    let opts = RequestOptions {
        use_cache: req.use_cache.unwrap_or(true),
    };

    match ctx.service.answer(&req.question, top_k, opts).await {
        Ok(answer) => Ok(HttpResponse::Ok().json(answer)),
        Err(e) => {
            warn!("[{}] Report failed: {}", request_id, e);
            Ok(service_error_response(&request_id, &e))
        }
    }
}

pub async fn cache_stats_handler(ctx: web::Data<AppContext>) -> Result<HttpResponse, Error> {
    let stats = ctx.service.cache().stats().await;
    Ok(HttpResponse::Ok().json(CacheStatsResponse {
        request_id: generate_request_id(),
        enabled: stats.enabled,
        backend: stats.backend.as_str(),
        entries: stats.entries,
        hits: stats.hits,
        misses: stats.misses,
        errors: stats.errors,
        hit_rate: stats.hit_rate(),
    }))
}

pub async fn cache_clear_handler(ctx: web::Data<AppContext>) -> Result<HttpResponse, Error> {
    let request_id = generate_request_id();
    match ctx.service.cache().clear().await {
        Ok(()) => Ok(HttpResponse::Ok().json(json!({
            "status": "cleared",
            "request_id": request_id,
        }))),
        Err(e) => {
            error!("[{}] Cache clear failed: {}", request_id, e);
            Ok(HttpResponse::InternalServerError().json(json!({
                "status": "error",
                "error": e.to_string(),
                "request_id": request_id,
            })))
        }
    }
}

/// GET /monitoring/metrics in Prometheus text format
async fn get_metrics() -> Result<HttpResponse, Error> {
    Ok(HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(metrics::export_prometheus()))
}

/// Route table, shared by the server and integration tests
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .service(web::scope("/monitoring").route("/metrics", web::get().to(get_metrics)))
        .route("/", web::get().to(root_handler))
        .route("/health", web::get().to(health_check))
        .route("/ingest", web::post().to(ingest_handler))
        .route("/report", web::post().to(report_handler))
        .route("/cache/stats", web::get().to(cache_stats_handler))
        .route("/cache/clear", web::post().to(cache_clear_handler));
}

pub fn start_api_server(ctx: web::Data<AppContext>) -> std::io::Result<Server> {
    let bind_addr = ctx.config.bind_addr();

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(vec!["GET", "POST"])
            .allowed_headers(vec![actix_web::http::header::CONTENT_TYPE])
            .max_age(3600);

        App::new()
            .app_data(ctx.clone())
            .wrap(cors)
            .configure(configure)
    })
    .bind(&bind_addr)?
    .run();

    info!(addr = %bind_addr, "API server listening");
    Ok(server)
}
