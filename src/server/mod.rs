mod account_routes;
pub mod config;
mod errors;
mod http_layers;
pub mod metrics;
mod playlist_routes;
pub mod server;
pub mod state;
mod tracks_routes;

pub use config::ServerConfig;
pub use http_layers::*;
pub use server::{make_app, run_server};
pub use state::ServerState;
