use crate::application::use_cases::history_gateway::HistoryGateway;
use crate::application::use_cases::submit_relay::{SubmitRelayRequest, SubmitRelayUseCase};
use crate::domain::history::{DEFAULT_LIMIT, DEFAULT_PAGE};
use crate::infrastructure::config::AppConfig;
use actix_cors::Cors;
use actix_web::{
    dev::Server, error::InternalError, get, post, web, App, HttpResponse, HttpServer, Responder,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

const SEND_FAILED: &str = "Failed to process request";
const HISTORY_FAILED: &str = "Failed to fetch history";
const JSON_PAYLOAD_LIMIT: usize = 2 * 1024 * 1024;

pub struct HttpState {
    pub submit_relay: SubmitRelayUseCase,
    pub history: HistoryGateway,
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
}

fn error_response(message: &'static str) -> HttpResponse {
    HttpResponse::InternalServerError().json(ErrorBody { error: message })
}

#[post("/send")]
async fn send(data: web::Data<HttpState>, req: web::Json<SubmitRelayRequest>) -> impl Responder {
    match data.submit_relay.execute(req.into_inner()).await {
        Ok(result) => HttpResponse::Ok().json(result),
        Err(e) => {
            error!(error = %e, "Failed to process relay request");
            error_response(SEND_FAILED)
        }
    }
}

// Raw strings so that junk values fall back to defaults instead of failing the request.
#[derive(Deserialize)]
struct HistoryQuery {
    page: Option<String>,
    limit: Option<String>,
}

#[get("/history")]
async fn list_history(
    data: web::Data<HttpState>,
    query: web::Query<HistoryQuery>,
) -> impl Responder {
    let page = parse_or(query.page.as_deref(), DEFAULT_PAGE);
    let limit = parse_or(query.limit.as_deref(), DEFAULT_LIMIT);

    let listing = data.history.list(page, limit).await;
    HttpResponse::Ok().json(listing)
}

fn parse_or(raw: Option<&str>, default: i64) -> i64 {
    raw.and_then(|value| value.trim().parse::<i64>().ok())
        .unwrap_or(default)
}

/// Registers the `/api` routes and their extractor error handling.
pub fn configure(cfg: &mut web::ServiceConfig) {
    let json_config = web::JsonConfig::default()
        .limit(JSON_PAYLOAD_LIMIT)
        .error_handler(|err, _req| {
            warn!(error = %err, "Rejected malformed relay request body");
            InternalError::from_response(err, error_response(SEND_FAILED)).into()
        });
    let query_config = web::QueryConfig::default().error_handler(|err, _req| {
        warn!(error = %err, "Rejected malformed history query");
        InternalError::from_response(err, error_response(HISTORY_FAILED)).into()
    });

    cfg.service(
        web::scope("/api")
            .app_data(json_config)
            .app_data(query_config)
            .service(send)
            .service(list_history),
    );
}

fn build_cors(allowed_origins: &[String]) -> Cors {
    if allowed_origins.is_empty() {
        return Cors::permissive();
    }
    allowed_origins
        .iter()
        .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
        .allow_any_method()
        .allow_any_header()
}

pub fn start_server(state: Arc<HttpState>, config: &AppConfig) -> std::io::Result<Server> {
    let state = web::Data::from(state);
    let allowed_origins = config.allowed_origins.clone();

    let server = HttpServer::new(move || {
        App::new()
            .wrap(build_cors(&allowed_origins))
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((config.host.as_str(), config.port))?
    .run();

    info!(host = %config.host, port = config.port, "HTTP API listening");
    Ok(server)
}
