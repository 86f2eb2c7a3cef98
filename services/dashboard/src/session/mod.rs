pub mod cookies;
pub mod manager;
pub mod monitor;
pub mod storage;
pub mod store;

pub use cookies::CookieJar;
pub use manager::{AuthError, AuthErrorCode, SessionManager};
pub use monitor::spawn_refresh_monitor;
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError};
pub use store::{AuthStatus, SessionStore};
