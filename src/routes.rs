mod compile;
mod history;

pub use compile::*;
pub use history::*;

use actix_web::error::{InternalError, JsonPayloadError};
use actix_web::{HttpRequest, HttpResponse, Responder, post, web};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

#[derive(Serialize)]
struct ErrorResponse {
    reason: &'static str,
    code: u32,
}

#[derive(Serialize)]
struct ErrorResponseWithMessage {
    reason: &'static str,
    code: u32,
    message: String,
}

pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = HttpResponse::BadRequest().json(ErrorResponse {
        reason: "ERR_INVALID_ARGUMENT",
        code: 1,
    });
    InternalError::from_response(err, response).into()
}

/// Starts the same graceful shutdown as ctrl-c
///
/// Running executions are cancelled, so their processes and workspaces are
/// released before the server stops.
#[post("/internal/exit")]
pub async fn exit(shutdown: web::Data<CancellationToken>) -> impl Responder {
    log::info!("Shutdown as requested");
    shutdown.cancel();
    HttpResponse::Ok().body("Exiting")
}
