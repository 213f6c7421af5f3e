use actix_web::{HttpResponse, Responder, post, web};
use serde::Deserialize;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use super::ErrorResponse;
use crate::engine::{Engine, ExecutionRequest};

/// Body of `POST /compile`
#[derive(Deserialize, Debug)]
pub struct CompileRequest {
    pub language: String,
    pub code: String,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub options: CompilerOptions,
}

/// Extra compiler flags, as a list or as one whitespace-separated line
#[derive(Deserialize, Debug, PartialEq)]
#[serde(untagged)]
pub enum CompilerOptions {
    List(Vec<String>),
    Line(String),
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

impl CompilerOptions {
    pub fn into_tokens(self) -> Vec<String> {
        match self {
            Self::List(tokens) => tokens,
            Self::Line(line) => line.split_whitespace().map(str::to_string).collect(),
        }
    }
}

impl From<CompileRequest> for ExecutionRequest {
    fn from(body: CompileRequest) -> Self {
        Self {
            language: body.language,
            code: body.code,
            stdin: body.input,
            options: body.options.into_tokens(),
        }
    }
}

/// Caps how many submissions are built and run at the same time
pub struct JobLimiter(pub Semaphore);

#[post("/compile")]
pub async fn compile_handler(
    engine: web::Data<Engine>,
    limiter: web::Data<JobLimiter>,
    shutdown: web::Data<CancellationToken>,
    body: web::Json<CompileRequest>,
) -> impl Responder {
    let _permit = match limiter.0.acquire().await {
        Ok(permit) => permit,
        Err(e) => {
            log::error!("Job limiter closed: {e}");
            return HttpResponse::ServiceUnavailable().json(ErrorResponse {
                reason: "ERR_INTERNAL",
                code: 6,
            });
        }
    };

    let request = ExecutionRequest::from(body.into_inner());
    log::debug!("Executing {} submission", request.language);

    // Dropping this future on client disconnect also kills the child processes
    let outcome = engine
        .execute_with_cancel(&request, &shutdown.child_token())
        .await;

    HttpResponse::Ok().json(outcome)
}
