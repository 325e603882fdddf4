use std::process::ExitCode;

use dotenv::dotenv;
use tracing::{error, info};

use hash_review_server::{
    config::AppConfig,
    http::{router::router::build_routes, server::HttpServer},
    logging,
    state::AppState,
};

fn main() -> ExitCode {
    dotenv().ok();
    logging::init();

    let cfg = AppConfig::from_env();

    let state = match AppState::from_config(&cfg) {
        Ok(state) => state,
        Err(e) => {
            error!("Startup failed: {e}");
            return ExitCode::FAILURE;
        }
    };
    info!(
        "Reviews stored with the {} backend, {} hash workers",
        state.reviews.backend(),
        cfg.hash_workers
    );

    let dispatcher = build_routes(state);
    let server = HttpServer::with_dispatcher(cfg.server, dispatcher);

    if let Err(e) = server.run() {
        error!("Server encountered a fatal error: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
