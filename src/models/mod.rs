mod interaction;
mod mood;
mod movie;
mod profile;
mod recommendation;

pub use interaction::{
    Ack, EventKind, FeedbackEvent, InteractionEvent, UserId, MAX_RATING, MIN_RATING,
};
pub use mood::{Mood, MoodOutcome, MoodVector};
pub use movie::{Genre, MovieFeature, MovieId};
pub use profile::{Affinity, ModelArtifact, MovieLatentProfile, UserLatentProfile};
pub use recommendation::{
    Explanation, Reason, RecommendationContext, RecommendationResult, ScoredMovie,
    SignalBreakdown, SimilarMovie, TrendingMovie,
};
