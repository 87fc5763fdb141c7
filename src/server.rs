use std::sync::Arc;

use actix_cors::Cors;
use actix_web::error::BlockingError;
use actix_web::http::StatusCode;
use actix_web::{web, App, HttpResponse, HttpServer, ResponseError};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::controller::StressController;
use crate::error::StressError;

pub struct AppState {
    pub controller: Arc<StressController>,
    pub stress_test_enabled: bool,
}

impl AppState {
    fn ensure_enabled(&self) -> Result<(), ApiError> {
        if self.stress_test_enabled {
            Ok(())
        } else {
            Err(StressError::Unavailable.into())
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Stress(#[from] StressError),
    #[error("stress controller task failed")]
    Blocking(#[from] BlockingError),
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Stress(StressError::InvalidParameter { .. }) => StatusCode::BAD_REQUEST,
            ApiError::Stress(StressError::Unavailable) => StatusCode::FORBIDDEN,
            ApiError::Stress(StressError::WorkerSpawn { .. }) | ApiError::Blocking(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let detail = match self {
            ApiError::Stress(StressError::InvalidParameter { .. }) => {
                "Invalid duration or load parameter".to_string()
            }
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(ErrorBody { detail })
    }
}

#[derive(Debug, Deserialize)]
pub struct StartParams {
    duration: Option<i64>,
    load: Option<i64>,
}

#[derive(Serialize)]
struct StartResponse {
    message: &'static str,
    duration: u64,
    load: u8,
    workers: usize,
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

async fn start_cpu_stress(
    state: web::Data<AppState>,
    params: web::Query<StartParams>,
) -> Result<HttpResponse, ApiError> {
    state.ensure_enabled()?;
    let duration = params.duration.unwrap_or(10);
    let load = params.load.unwrap_or(100);

    let controller = Arc::clone(&state.controller);
    let report = web::block(move || controller.start(duration, load)).await??;

    Ok(HttpResponse::Ok().json(StartResponse {
        message: "CPU stress test started",
        duration: report.duration,
        load: report.load,
        workers: report.workers,
    }))
}

async fn stop_cpu_stress(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    state.ensure_enabled()?;
    let controller = Arc::clone(&state.controller);
    web::block(move || controller.stop()).await?;

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "CPU stress test stopped",
    }))
}

async fn stress_status(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    state.ensure_enabled()?;
    // Shares the controller lock with start/stop, which may wait on workers.
    let controller = Arc::clone(&state.controller);
    let status = web::block(move || controller.status()).await?;
    Ok(HttpResponse::Ok().json(status))
}

/// Registers the stress endpoints; shared by the server and the tests.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/start_cpu_stress", web::get().to(start_cpu_stress))
        .route("/stop_cpu_stress", web::get().to(stop_cpu_stress))
        .route("/stress_status", web::get().to(stress_status));
}

pub async fn serve(state: AppState, host: &str, port: u16) -> std::io::Result<()> {
    info!(
        host,
        port,
        stress_test_enabled = state.stress_test_enabled,
        "starting stress test server"
    );
    let state = web::Data::new(state);

    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .app_data(state.clone())
            .configure(routes)
    })
    .bind((host, port))?
    .run()
    .await
}
