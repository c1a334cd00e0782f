//! Durable per-player storage.

mod error;
mod models;
mod repository;
mod schema; // Diesel generated schema - internal use only
mod store;

pub use error::{StoreError, StoreErrorKind};
pub use models::{NewPlayer, PlayerId, PlayerRecord};
pub use repository::SqlitePlayerStore;
pub use store::PlayerStore;
