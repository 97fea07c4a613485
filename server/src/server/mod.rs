mod rail_server;
pub use rail_server::{RailServer, VAULT_SECRET_PREFIX};

mod server_config;
pub use server_config::ServerConfig;
