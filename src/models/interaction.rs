use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::MovieId;
use crate::error::{AppError, AppResult};

/// User identifier issued by the (external) account system
pub type UserId = Uuid;

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

/// Kind of feedback carried by an interaction event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    /// Explicit rating on the 1-5 scale
    Rating { value: u8 },
    /// Implicit positive signal: the user watched the movie
    Watch,
    /// Implicit positive signal: the user opened the movie
    Click,
}

impl EventKind {
    pub fn is_explicit(&self) -> bool {
        matches!(self, EventKind::Rating { .. })
    }

    pub fn rating(&self) -> Option<u8> {
        match self {
            EventKind::Rating { value } => Some(*value),
            _ => None,
        }
    }
}

/// One entry of the append-only feedback log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InteractionEvent {
    /// Client-supplied identifier used for idempotent recording
    pub event_id: Uuid,
    /// Position in the log, assigned on append
    pub sequence: u64,
    pub user_id: UserId,
    pub movie_id: MovieId,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
}

/// Feedback as submitted by the API layer, before validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEvent {
    #[serde(default)]
    pub event_id: Option<Uuid>,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub movie_id: Option<MovieId>,
    #[serde(flatten)]
    pub kind: EventKind,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Free-form client context (mood filter, screen, ...). Never validated.
    #[serde(default)]
    pub context: Option<serde_json::Value>,
}

impl FeedbackEvent {
    /// Validates identifiers and normalises the event for the log
    ///
    /// Only missing user or movie identifiers are rejected. Out-of-scale ratings
    /// are clamped onto 1-5 and a missing event id gets a fresh one.
    pub fn into_interaction(self, sequence: u64) -> AppResult<InteractionEvent> {
        let user_id = self
            .user_id
            .ok_or_else(|| AppError::Validation("missing user_id".to_string()))?;
        let movie_id = self
            .movie_id
            .ok_or_else(|| AppError::Validation("missing movie_id".to_string()))?;

        let kind = match self.kind {
            EventKind::Rating { value } if !(MIN_RATING..=MAX_RATING).contains(&value) => {
                tracing::warn!(
                    user_id = %user_id,
                    movie_id,
                    value,
                    "Rating outside 1-5, clamping"
                );
                EventKind::Rating {
                    value: value.clamp(MIN_RATING, MAX_RATING),
                }
            }
            other => other,
        };

        Ok(InteractionEvent {
            event_id: self.event_id.unwrap_or_else(Uuid::new_v4),
            sequence,
            user_id,
            movie_id,
            kind,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
        })
    }
}

/// Acknowledgement returned for every accepted feedback submission
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ack {
    pub event_id: Uuid,
    /// True when the event id had already been recorded and this call was a no-op
    pub duplicate: bool,
    pub model_version: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rating_event(user: Option<UserId>, movie: Option<MovieId>, value: u8) -> FeedbackEvent {
        FeedbackEvent {
            event_id: Some(Uuid::new_v4()),
            user_id: user,
            movie_id: movie,
            kind: EventKind::Rating { value },
            timestamp: None,
            context: None,
        }
    }

    #[test]
    fn test_missing_identifiers_are_rejected() {
        let err = rating_event(None, Some(1), 4).into_interaction(0).unwrap_err();
        assert_eq!(err, AppError::Validation("missing user_id".to_string()));

        let err = rating_event(Some(Uuid::new_v4()), None, 4)
            .into_interaction(0)
            .unwrap_err();
        assert_eq!(err, AppError::Validation("missing movie_id".to_string()));
    }

    #[test]
    fn test_out_of_scale_rating_is_clamped() {
        let event = rating_event(Some(Uuid::new_v4()), Some(1), 9)
            .into_interaction(3)
            .unwrap();
        assert_eq!(event.kind, EventKind::Rating { value: 5 });
        assert_eq!(event.sequence, 3);
    }

    #[test]
    fn test_malformed_context_is_accepted() {
        let json = serde_json::json!({
            "event_id": Uuid::new_v4(),
            "user_id": Uuid::new_v4(),
            "movie_id": 42,
            "kind": "watch",
            "context": {"mood": 17, "weird": [null]}
        });
        let event: FeedbackEvent = serde_json::from_value(json).unwrap();
        let interaction = event.into_interaction(0).unwrap();
        assert_eq!(interaction.kind, EventKind::Watch);
        assert_eq!(interaction.movie_id, 42);
    }

    #[test]
    fn test_event_kind_wire_format() {
        let json = serde_json::to_value(EventKind::Rating { value: 4 }).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "rating", "value": 4}));
        assert!(!EventKind::Click.is_explicit());
        assert_eq!(EventKind::Rating { value: 2 }.rating(), Some(2));
    }
}
