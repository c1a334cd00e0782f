//! Database models.

use chrono::NaiveDateTime;
use derive_getters::Getters;
use derive_new::new;
use diesel::prelude::*;

use crate::db::schema;

/// Stable identifier of a player, as issued by the chat transport.
pub type PlayerId = i64;

/// Player record database model.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Identifiable, Selectable, Getters)]
#[diesel(table_name = schema::players)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PlayerRecord {
    id: PlayerId,
    display_name: Option<String>,
    high_score: i64,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

/// Insertable player model. New players always start at a high score of zero.
#[derive(Debug, Clone, Insertable, new, Getters)]
#[diesel(table_name = schema::players)]
pub struct NewPlayer {
    id: PlayerId,
    display_name: Option<String>,
    #[new(value = "0")]
    high_score: i64,
}
