use clap::Parser;
use tokio_util::sync::CancellationToken;

use runbox::config::CliArgs;
use runbox::database as db;
use runbox::web_server::build_server;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = CliArgs::parse();
    let config = cli.to_config().expect("Failed to load configuration");
    let db_path = db::get_db_path();

    if cli.flush_data {
        db::remove_db(&db_path);
    }

    let db_pool = db::init_db(&db_path)
        .await
        .expect("Failed to initialize database");

    let shutdown_token = CancellationToken::new();

    let server =
        build_server(config, db_pool, shutdown_token.clone()).expect("Failed to build server");

    let server_handle = server.handle();
    let server_task = actix_web::rt::spawn(server);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("Ctrl-c received, shutting down...");
        }
        _ = shutdown_token.cancelled() => {
            log::info!("Shutdown requested over HTTP, shutting down...");
        }
        res_server = server_task => {
            log::error!("Server terminated unexpectedly: {:?}", res_server);
        }
    }

    // 1. Kill running submissions so in-flight requests finish promptly
    shutdown_token.cancel();

    // 2. Shutdown actix-web server gracefully
    server_handle.stop(true).await;

    log::info!("Shutdown complete");
    Ok(())
}
