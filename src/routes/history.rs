use actix_web::{HttpResponse, Responder, delete, get, post, web};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;

use super::{ErrorResponse, ErrorResponseWithMessage};
use crate::database as db;
use crate::engine::Language;

/// Body of `POST /history`
#[derive(Deserialize, Debug)]
pub struct NewHistoryEntry {
    pub language: String,
    pub code: String,
    pub title: Option<String>,
}

#[derive(Serialize)]
struct Deleted {
    deleted: i64,
}

fn not_found(id: i64) -> HttpResponse {
    HttpResponse::NotFound().json(ErrorResponseWithMessage {
        reason: "ERR_NOT_FOUND",
        code: 3,
        message: format!("History entry {id} not found."),
    })
}

fn external_error() -> HttpResponse {
    HttpResponse::InternalServerError().json(ErrorResponse {
        reason: "ERR_EXTERNAL",
        code: 5,
    })
}

#[get("/history")]
pub async fn get_history_handler(pool: web::Data<SqlitePool>) -> impl Responder {
    match db::get_all_code_history(pool.get_ref()).await {
        Ok(entries) => {
            log::info!("Got {} history entries", entries.len());
            HttpResponse::Ok().json(entries)
        }
        Err(e) => {
            log::error!("Failed to retrieve history: {e}");
            external_error()
        }
    }
}

#[post("/history")]
pub async fn post_history_handler(
    pool: web::Data<SqlitePool>,
    body: web::Json<NewHistoryEntry>,
) -> impl Responder {
    if body.language.parse::<Language>().is_err() {
        return HttpResponse::BadRequest().json(ErrorResponseWithMessage {
            reason: "ERR_INVALID_ARGUMENT",
            code: 1,
            message: format!("Unsupported language: {}", body.language),
        });
    }

    match db::add_code_history(pool.get_ref(), &body.language, &body.code, body.title.as_deref()).await {
        Ok(entry) => {
            log::info!("Saved history entry {}", entry.id);
            HttpResponse::Ok().json(entry)
        }
        Err(e) => {
            log::error!("Failed to save history entry: {e}");
            external_error()
        }
    }
}

#[get("/history/{id}")]
pub async fn get_history_by_id_handler(
    pool: web::Data<SqlitePool>,
    path: web::Path<(i64,)>,
) -> impl Responder {
    let id = path.into_inner().0;

    match db::get_code_history_by_id(pool.get_ref(), id).await {
        Ok(Some(entry)) => HttpResponse::Ok().json(entry),
        Ok(None) => {
            log::info!("Got nothing with history id {id} from database");
            not_found(id)
        }
        Err(e) => {
            log::error!("Failed to retrieve history entry {id}: {e}");
            external_error()
        }
    }
}

#[delete("/history/{id}")]
pub async fn delete_history_handler(
    pool: web::Data<SqlitePool>,
    path: web::Path<(i64,)>,
) -> impl Responder {
    let id = path.into_inner().0;

    match db::delete_code_history_by_id(pool.get_ref(), id).await {
        Ok(true) => HttpResponse::Ok().json(Deleted { deleted: id }),
        Ok(false) => not_found(id),
        Err(e) => {
            log::error!("Failed to delete history entry {id}: {e}");
            external_error()
        }
    }
}
