//! Mood/sentiment scoring of aggregated review text
//!
//! The classifier is pluggable: anything that maps text to a distribution over
//! the fixed mood taxonomy. The scorer only decides when there is enough text
//! for that distribution to mean something.
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::models::{Genre, Mood, MoodOutcome, MoodVector, MovieId};
use crate::services::feature_store::RecentGenres;

/// Text-to-mood classifier contract
pub trait MoodClassifier: Send + Sync {
    /// Probability distribution over `Mood::ALL` for the given text
    fn classify(&self, text: &str) -> BTreeMap<Mood, f32>;

    /// Classifier name for logging and debugging
    fn name(&self) -> &'static str;
}

const DEFAULT_LEXICON: &[(Mood, &[&str])] = &[
    (
        Mood::Uplifting,
        &["uplifting", "joy", "heartwarming", "inspiring", "hopeful", "cheerful", "feel-good", "positive"],
    ),
    (
        Mood::Tense,
        &["tense", "thrilling", "intense", "gripping", "suspense", "edge of my seat", "nail-biting", "adrenaline"],
    ),
    (
        Mood::Melancholic,
        &["sad", "tragic", "heartbreaking", "melancholy", "tearjerker", "bittersweet", "grief", "cried"],
    ),
    (
        Mood::Comedic,
        &["funny", "hilarious", "laugh", "comedy", "witty", "lighthearted", "silly", "jokes"],
    ),
    (
        Mood::Romantic,
        &["romantic", "love story", "romance", "chemistry", "passion", "relationship", "intimate"],
    ),
    (
        Mood::Scary,
        &["scary", "terrifying", "creepy", "horror", "frightening", "disturbing", "jump scare"],
    ),
    (
        Mood::Thoughtful,
        &["thought-provoking", "philosophical", "deep", "complex", "intellectual", "profound", "meditative"],
    ),
    (
        Mood::Adventurous,
        &["adventure", "epic", "journey", "quest", "exploration", "action-packed", "spectacle"],
    ),
];

/// Keyword-lexicon classifier with additive smoothing
pub struct LexiconClassifier {
    lexicon: &'static [(Mood, &'static [&'static str])],
    smoothing: f32,
}

impl Default for LexiconClassifier {
    fn default() -> Self {
        Self {
            lexicon: DEFAULT_LEXICON,
            smoothing: 1.0,
        }
    }
}

impl LexiconClassifier {
    fn count_hits(text: &str, words: &[&str], keyword: &str) -> usize {
        if keyword.contains(' ') {
            text.matches(keyword).count()
        } else {
            words.iter().filter(|w| **w == keyword).count()
        }
    }
}

impl MoodClassifier for LexiconClassifier {
    fn classify(&self, text: &str) -> BTreeMap<Mood, f32> {
        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !(c.is_alphanumeric() || c == '-'))
            .filter(|w| !w.is_empty())
            .collect();

        let counts: Vec<(Mood, f32)> = self
            .lexicon
            .iter()
            .map(|(mood, keywords)| {
                let hits: usize = keywords
                    .iter()
                    .map(|k| Self::count_hits(&lowered, &words, k))
                    .sum();
                (*mood, hits as f32)
            })
            .collect();

        let total: f32 =
            counts.iter().map(|(_, c)| c).sum::<f32>() + self.smoothing * Mood::ALL.len() as f32;

        counts
            .into_iter()
            .map(|(mood, c)| (mood, (c + self.smoothing) / total))
            .collect()
    }

    fn name(&self) -> &'static str {
        "lexicon"
    }
}

/// Genres that viewers in each mood tend to pick
const MOOD_GENRES: &[(Mood, &[Genre])] = &[
    (
        Mood::Uplifting,
        &[Genre::Comedy, Genre::Family, Genre::Animation, Genre::Music, Genre::Romance],
    ),
    (Mood::Tense, &[Genre::Thriller, Genre::Crime, Genre::Mystery, Genre::War]),
    (Mood::Melancholic, &[Genre::Drama, Genre::Romance]),
    (Mood::Comedic, &[Genre::Comedy, Genre::Animation, Genre::Family]),
    (Mood::Romantic, &[Genre::Romance, Genre::Drama]),
    (Mood::Scary, &[Genre::Horror, Genre::Thriller]),
    (
        Mood::Thoughtful,
        &[Genre::Drama, Genre::Documentary, Genre::Mystery, Genre::ScienceFiction, Genre::History],
    ),
    (
        Mood::Adventurous,
        &[Genre::Adventure, Genre::Action, Genre::Fantasy, Genre::ScienceFiction, Genre::Western],
    ),
];

/// Most likely current mood from the genres of a user's recent ratings
///
/// Ties go to the mood listed first in `Mood::ALL`.
pub fn infer_mood(recent: &RecentGenres) -> Option<Mood> {
    if recent.ratings == 0 {
        return None;
    }

    let mut best: Option<(Mood, f32)> = None;
    for (mood, genres) in MOOD_GENRES {
        let score = genres
            .iter()
            .map(|g| recent.weights.get(g).copied().unwrap_or(0.0))
            .sum::<f32>()
            / recent.ratings as f32;
        if score > 0.0 && best.map_or(true, |(_, top)| score > top) {
            best = Some((*mood, score));
        }
    }
    best.map(|(mood, _)| mood)
}

/// Stateless scorer turning a movie's reviews into a mood outcome
#[derive(Clone)]
pub struct MoodScorer {
    classifier: Arc<dyn MoodClassifier>,
    min_reviews: usize,
}

impl MoodScorer {
    pub fn new(classifier: Arc<dyn MoodClassifier>, min_reviews: usize) -> Self {
        Self {
            classifier,
            min_reviews,
        }
    }

    pub fn mood_of(&self, movie_id: MovieId, reviews: &[String]) -> MoodOutcome {
        let texts: Vec<&str> = reviews
            .iter()
            .map(|r| r.trim())
            .filter(|r| !r.is_empty())
            .collect();

        if texts.len() < self.min_reviews {
            tracing::debug!(
                movie_id,
                reviews = texts.len(),
                required = self.min_reviews,
                "Not enough reviews for mood classification"
            );
            return MoodOutcome::InsufficientData(MoodVector::uniform(movie_id));
        }

        let mut distribution = self.classifier.classify(&texts.join("\n"));
        for mood in Mood::ALL {
            distribution.entry(mood).or_insert(0.0);
        }
        let total: f32 = distribution.values().sum();
        if total <= 0.0 || !total.is_finite() {
            tracing::warn!(
                movie_id,
                classifier = self.classifier.name(),
                "Classifier returned a degenerate distribution"
            );
            return MoodOutcome::InsufficientData(MoodVector::uniform(movie_id));
        }
        for p in distribution.values_mut() {
            *p /= total;
        }

        MoodOutcome::Classified(MoodVector {
            movie_id,
            distribution,
        })
    }
}

/// Latest mood outcome per movie, refreshed by the review pipeline trigger
#[derive(Default)]
pub struct MoodIndex {
    outcomes: DashMap<MovieId, MoodOutcome>,
}

impl MoodIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, outcome: MoodOutcome) {
        self.outcomes.insert(outcome.vector().movie_id, outcome);
    }

    /// Stored outcome, or an uninformative one for movies never scored
    pub fn get(&self, movie_id: MovieId) -> MoodOutcome {
        self.outcomes
            .get(&movie_id)
            .map(|o| o.value().clone())
            .unwrap_or_else(|| MoodOutcome::InsufficientData(MoodVector::uniform(movie_id)))
    }

    /// Mood alignment in [0, 1], or None when the mood signal is absent
    pub fn alignment(&self, movie_id: MovieId, mood: Mood) -> Option<f32> {
        match self.outcomes.get(&movie_id)?.value() {
            MoodOutcome::Classified(vector) => Some(vector.probability(mood)),
            MoodOutcome::InsufficientData(_) => None,
        }
    }
}
