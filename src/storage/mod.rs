mod feeds;
mod items;
mod schema;
mod settings;
mod types;

pub use schema::Database;
pub use settings::REFRESH_INTERVAL_KEY;
pub use types::StorageError;
