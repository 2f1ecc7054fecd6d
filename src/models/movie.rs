use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Display;

/// Catalog movie identifier (TMDB numeric id)
pub type MovieId = u64;

/// Fixed genre taxonomy the models are trained against
///
/// Upstream genre names outside this set are rejected at ingestion time
/// rather than being accepted ad hoc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Genre {
    Action,
    Adventure,
    Animation,
    Comedy,
    Crime,
    Documentary,
    Drama,
    Family,
    Fantasy,
    History,
    Horror,
    Music,
    Mystery,
    Romance,
    ScienceFiction,
    Thriller,
    War,
    Western,
}

impl Display for Genre {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        write!(f, "{}", name)
    }
}

/// Content features for one movie in a catalog snapshot
///
/// Immutable once computed; re-embedding replaces the whole record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MovieFeature {
    pub movie_id: MovieId,
    /// Dense content embedding of the store's fixed dimension
    pub embedding: Vec<f32>,
    /// Genres in upstream order; the first is the primary genre
    pub genres: Vec<Genre>,
    #[serde(default)]
    pub keywords: BTreeSet<String>,
    /// Release date as seconds since the Unix epoch
    pub release_epoch: i64,
    pub popularity: f64,
}

impl MovieFeature {
    pub fn primary_genre(&self) -> Option<Genre> {
        self.genres.first().copied()
    }

    /// Number of genres and keywords shared with another movie
    pub fn overlap(&self, other: &MovieFeature) -> usize {
        let genres = self
            .genres
            .iter()
            .filter(|g| other.genres.contains(g))
            .count();
        let keywords = self.keywords.intersection(&other.keywords).count();
        genres + keywords
    }

    pub fn shared_genres(&self, other: &MovieFeature) -> Vec<Genre> {
        self.genres
            .iter()
            .filter(|g| other.genres.contains(g))
            .copied()
            .collect()
    }
}
