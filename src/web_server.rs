use actix_web::{App, HttpServer, dev::Server, middleware, web};
use sqlx::sqlite::SqlitePool;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, ServerConfig};
use crate::engine::Engine;
use crate::routes::{
    JobLimiter, compile_handler, delete_history_handler, exit, get_history_by_id_handler,
    get_history_handler, json_error_handler, post_history_handler,
};

/// Registers every route on `cfg`; shared by the server and the tests
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .service(compile_handler)
        .service(get_history_handler)
        .service(post_history_handler)
        .service(get_history_by_id_handler)
        .service(delete_history_handler)
        .service(exit);
}

pub fn build_server(
    config: Config,
    db_pool: SqlitePool,
    shutdown: CancellationToken,
) -> std::io::Result<Server> {
    let Config {
        server: server_config,
        engine: engine_config,
    } = config;
    let max_jobs = server_config
        .max_concurrent_jobs
        .unwrap_or(ServerConfig::DEFAULT_CONCURRENT_JOBS)
        .max(1);

    log::info!(
        "Workspaces under {}, at most {max_jobs} concurrent jobs",
        engine_config.workspace_root().display()
    );

    let engine = web::Data::new(Engine::new(engine_config));
    let limiter = web::Data::new(JobLimiter(Semaphore::new(max_jobs)));
    let db_pool = web::Data::new(db_pool);
    let shutdown = web::Data::new(shutdown);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(engine.clone())
            .app_data(limiter.clone())
            .app_data(db_pool.clone())
            .app_data(shutdown.clone())
            .wrap(middleware::Logger::default())
            .configure(configure_routes)
    })
    .bind((
        server_config
            .bind_address
            .unwrap_or(ServerConfig::DEFAULT_ADDRESS.to_string()),
        server_config.bind_port.unwrap_or(ServerConfig::DEFAULT_PORT),
    ))?
    .run();

    Ok(server)
}
