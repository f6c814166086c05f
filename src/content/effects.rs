//! Randomized style knobs applied to each generated post.

use rand::Rng;
use rand::seq::SliceRandom;
use rand_distr::{Distribution, Normal};
use serde::Serialize;

pub const EMOTIONS: &[&str] = &[
    "confident",
    "triumphant",
    "enthusiastic",
    "prideful",
    "satisfied",
    "determined",
    "thrilled",
    "amused",
    "dominating",
    "curious",
    "excited",
    "competitive",
    "bold",
    "joyful",
    "motivated",
    "victorious",
    "calm",
    "self-assured",
    "exhausted",
    "bored",
    "frustrated",
];

pub const TONES: &[&str] = &[
    "alpha",
    "motivational guru",
    "investment banker",
    "cryptobro",
    "cryptogirl",
    "influencer",
    "beastmode",
    "minimalist",
    "late-night radio host",
    "tabloid columnist",
];

/// One draw of style effects.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StyleEffects {
    /// Blend a third candidate instead of the previous post.
    pub use_third: bool,
    /// Tag the author of the first candidate.
    pub tag: bool,
    pub emojis: bool,
    pub emotion: String,
    pub tone: String,
    /// Target length in characters.
    pub length: u32,
    /// Write about a piece of background lore.
    pub lore: bool,
    /// Shuffle the inner letters of source words.
    pub scramble: bool,
    /// Ask for typos and mixed case.
    pub mistakes: bool,
    pub third_person: bool,
    pub sick_joke: bool,
    pub solidarity: bool,
}

impl Default for StyleEffects {
    fn default() -> Self {
        Self {
            use_third: false,
            tag: false,
            emojis: false,
            emotion: "calm".to_string(),
            tone: "minimalist".to_string(),
            length: 40,
            lore: false,
            scramble: false,
            mistakes: false,
            third_person: false,
            sick_joke: false,
            solidarity: false,
        }
    }
}

/// Probabilities used when drawing [`StyleEffects`].
#[derive(Debug, Clone, PartialEq)]
pub struct EffectOdds {
    pub use_third: f64,
    pub tag: f64,
    pub emojis: f64,
    pub lore: f64,
    pub scramble: f64,
    pub mistakes: f64,
    pub third_person: f64,
    pub sick_joke: f64,
    pub solidarity: f64,
    pub length_mean: f64,
    pub length_std_dev: f64,
    pub length_min: u32,
    pub length_max: u32,
    /// Length multiplier when lore is selected.
    pub lore_length_factor: u32,
}

impl Default for EffectOdds {
    fn default() -> Self {
        Self {
            use_third: 0.5,
            tag: 0.33,
            emojis: 0.05,
            // Lore posts are switched off.
            lore: 0.0,
            scramble: 0.1,
            mistakes: 2.0 / 3.0,
            third_person: 0.01,
            sick_joke: 0.01,
            solidarity: 0.001,
            length_mean: 40.0,
            length_std_dev: 40.0,
            length_min: 10,
            length_max: 220,
            lore_length_factor: 4,
        }
    }
}

impl EffectOdds {
    /// Draw a set of effects.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> StyleEffects {
        let lore = chance(rng, self.lore);
        let mut length = self.draw_length(rng);
        if lore {
            length = length.saturating_mul(self.lore_length_factor);
        }

        StyleEffects {
            use_third: chance(rng, self.use_third),
            tag: chance(rng, self.tag),
            emojis: chance(rng, self.emojis),
            emotion: pick_word(rng, EMOTIONS),
            tone: pick_word(rng, TONES),
            length,
            lore,
            scramble: chance(rng, self.scramble),
            mistakes: chance(rng, self.mistakes),
            third_person: chance(rng, self.third_person),
            sick_joke: chance(rng, self.sick_joke),
            solidarity: chance(rng, self.solidarity),
        }
    }

    fn draw_length<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        let raw = Normal::new(self.length_mean, self.length_std_dev)
            .map(|dist| dist.sample(rng))
            .unwrap_or(self.length_mean);
        let clamped = raw.clamp(f64::from(self.length_min), f64::from(self.length_max));
        clamped as u32
    }
}

fn chance<R: Rng + ?Sized>(rng: &mut R, p: f64) -> bool {
    rng.gen_bool(p.clamp(0.0, 1.0))
}

fn pick_word<R: Rng + ?Sized>(rng: &mut R, words: &[&str]) -> String {
    words.choose(rng).copied().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_length_always_clamped() {
        let odds = EffectOdds::default();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let effects = odds.pick(&mut rng);
            assert!((10..=220).contains(&effects.length));
            assert!(EMOTIONS.contains(&effects.emotion.as_str()));
            assert!(TONES.contains(&effects.tone.as_str()));
            assert!(!effects.lore);
        }
    }

    #[test]
    fn test_certain_odds() {
        let odds = EffectOdds {
            use_third: 1.0,
            tag: 1.0,
            emojis: 0.0,
            lore: 1.0,
            mistakes: 0.0,
            ..EffectOdds::default()
        };
        let mut rng = StdRng::seed_from_u64(1);
        let effects = odds.pick(&mut rng);
        assert!(effects.use_third);
        assert!(effects.tag);
        assert!(!effects.emojis);
        assert!(!effects.mistakes);
        assert!(effects.lore);
        assert!(effects.length >= 40);
    }

    #[test]
    fn test_out_of_range_probability_is_clamped() {
        let odds = EffectOdds {
            tag: 3.0,
            emojis: -1.0,
            ..EffectOdds::default()
        };
        let mut rng = StdRng::seed_from_u64(3);
        let effects = odds.pick(&mut rng);
        assert!(effects.tag);
        assert!(!effects.emojis);
    }

    #[test]
    fn test_rough_tag_frequency() {
        let odds = EffectOdds::default();
        let mut rng = StdRng::seed_from_u64(42);
        let tagged = (0..3000).filter(|_| odds.pick(&mut rng).tag).count();
        assert!((800..1200).contains(&tagged), "tagged {tagged} of 3000");
    }
}
