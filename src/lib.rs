pub mod config;
pub mod digest;
pub mod http;
pub mod logging;
pub mod reviews;
pub mod state;
pub mod utils;
pub mod worker_pool;
