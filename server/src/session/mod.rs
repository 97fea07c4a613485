mod session;

pub use session::{Session, SessionKey, SessionState};
