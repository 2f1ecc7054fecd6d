use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use super::MovieId;

/// Fixed mood taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mood {
    Uplifting,
    Tense,
    Melancholic,
    Comedic,
    Romantic,
    Scary,
    Thoughtful,
    Adventurous,
}

impl Mood {
    pub const ALL: [Mood; 8] = [
        Mood::Uplifting,
        Mood::Tense,
        Mood::Melancholic,
        Mood::Comedic,
        Mood::Romantic,
        Mood::Scary,
        Mood::Thoughtful,
        Mood::Adventurous,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Uplifting => "uplifting",
            Mood::Tense => "tense",
            Mood::Melancholic => "melancholic",
            Mood::Comedic => "comedic",
            Mood::Romantic => "romantic",
            Mood::Scary => "scary",
            Mood::Thoughtful => "thoughtful",
            Mood::Adventurous => "adventurous",
        }
    }
}

impl Display for Mood {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Mood {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase();
        Mood::ALL
            .iter()
            .find(|m| m.as_str() == needle)
            .copied()
            .ok_or_else(|| format!("unknown mood '{}'", s))
    }
}

/// Probability distribution over the mood taxonomy for one movie
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MoodVector {
    pub movie_id: MovieId,
    pub distribution: BTreeMap<Mood, f32>,
}

impl MoodVector {
    pub fn uniform(movie_id: MovieId) -> Self {
        let p = 1.0 / Mood::ALL.len() as f32;
        Self {
            movie_id,
            distribution: Mood::ALL.iter().map(|m| (*m, p)).collect(),
        }
    }

    pub fn probability(&self, mood: Mood) -> f32 {
        self.distribution.get(&mood).copied().unwrap_or(0.0)
    }

    /// Most probable mood; ties resolve to the earlier taxonomy entry
    pub fn dominant(&self) -> Option<(Mood, f32)> {
        Mood::ALL
            .iter()
            .map(|m| (*m, self.probability(*m)))
            .fold(None, |best, (m, p)| match best {
                Some((_, bp)) if bp >= p => best,
                _ => Some((m, p)),
            })
    }
}

/// Result of scoring a movie's reviews
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", content = "mood", rename_all = "snake_case")]
pub enum MoodOutcome {
    Classified(MoodVector),
    /// Too few reviews; carries a uniform, non-informative distribution
    InsufficientData(MoodVector),
}

impl MoodOutcome {
    pub fn vector(&self) -> &MoodVector {
        match self {
            MoodOutcome::Classified(v) | MoodOutcome::InsufficientData(v) => v,
        }
    }

    pub fn is_informative(&self) -> bool {
        matches!(self, MoodOutcome::Classified(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_sums_to_one() {
        let v = MoodVector::uniform(3);
        let total: f32 = v.distribution.values().sum();
        assert!((total - 1.0).abs() < 1e-6);
        assert_eq!(v.dominant().map(|(m, _)| m), Some(Mood::Uplifting));
    }

    #[test]
    fn test_parse_mood() {
        assert_eq!(" Tense ".parse::<Mood>(), Ok(Mood::Tense));
        assert!("hangry".parse::<Mood>().is_err());
    }

    #[test]
    fn test_dominant_mood() {
        let mut v = MoodVector::uniform(1);
        v.distribution.insert(Mood::Scary, 0.6);
        assert_eq!(v.dominant(), Some((Mood::Scary, 0.6)));
    }
}
