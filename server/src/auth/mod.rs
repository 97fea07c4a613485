mod auth_config;
mod auth_protocol;
mod error;

pub use auth_config::AuthConfig;
pub use auth_protocol::{AuthProtocol, ReconnectToken};
pub use error::AuthError;
