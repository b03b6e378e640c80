pub mod config;
pub mod mock;
pub mod synchronizer;
pub mod unseen;
pub mod view;

pub use config::SyncConfig;
pub use synchronizer::InboxSynchronizer;
pub use unseen::UnseenWatcher;
pub use view::{ConnectionState, ViewSnapshot};
