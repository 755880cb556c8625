use serde::{Deserialize, Serialize};

/// A historical (user, event) rating joined with the event's metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RatingRecord {
    pub category: String,
    /// True when the event has no price
    pub free: bool,
    pub start_hour: i32,
    pub end_hour: i32,
    pub is_private: bool,
    pub rate: i32,
}

/// An event starting in the future, not yet rated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UpcomingEvent {
    pub id: i64,
    pub event_type: String,
    pub category: String,
    pub free: bool,
    pub start_hour: i32,
    pub end_hour: i32,
    pub is_private: bool,
}

/// An upcoming event annotated with its predicted rate, as returned to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoredEvent {
    pub id: i64,
    pub event_type: String,
    pub category: String,
    pub prediction: i32,
}

impl ScoredEvent {
    pub fn new(event: UpcomingEvent, prediction: i32) -> Self {
        Self {
            id: event.id,
            event_type: event.event_type,
            category: event.category,
            prediction,
        }
    }
}
