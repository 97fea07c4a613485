use thiserror::Error;

/// Failures reported by, or observed around, a plugin sink
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginError {
    /// The sink returned an error
    #[error("Plugin {plugin} failed: {reason}")]
    Failed { plugin: String, reason: String },

    /// The sink panicked while handling a notification
    #[error("Plugin {plugin} panicked")]
    Panicked { plugin: String },
}
