pub mod session;

pub use session::{Cookie, SessionRecord, SessionStore};
