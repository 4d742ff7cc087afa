//! Web interface module
//!
//! JSON over HTTP: `GET /stats` for counters, `POST /command` to run one
//! command against database 0.

mod handlers;
mod server;

pub use handlers::AppState;
pub use server::{router, run_web_server};
