mod error;
mod plugin_hub;

pub use error::PluginError;
pub use plugin_hub::{PluginBatch, PluginHub, PluginNotification, PluginSink};
