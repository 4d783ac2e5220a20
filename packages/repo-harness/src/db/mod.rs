pub mod connect;
pub mod session;

pub use connect::{connect, sanitize_db_url};
pub use session::Session;
