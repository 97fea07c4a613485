pub mod codec;
pub mod constants;
pub mod error;
pub mod events;
pub mod message;
