//! Agent personality loaded from `config/agent_personality.json`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ContentError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonalityCore {
    /// Five Factor Model scores, rendered verbatim into prompts.
    #[serde(default)]
    pub ffm_traits: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hair {
    #[serde(default)]
    pub style: String,
    #[serde(default)]
    pub color: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalDescription {
    #[serde(default)]
    pub hair: Hair,
    #[serde(default)]
    pub eyes: String,
    #[serde(default)]
    pub ethnicity: String,
    #[serde(default)]
    pub skin: String,
    #[serde(default)]
    pub build: String,
    #[serde(default)]
    pub distinctive_features: Vec<String>,
}

impl PhysicalDescription {
    fn render(&self) -> String {
        let mut parts = Vec::new();
        let hair = join_nonempty(&[self.hair.style.as_str(), self.hair.color.as_str()]);
        if !hair.is_empty() {
            parts.push(format!("{} hair", hair));
        }
        if !self.eyes.is_empty() {
            parts.push(format!("{} eyes", self.eyes));
        }
        if !self.ethnicity.is_empty() {
            parts.push(self.ethnicity.clone());
        }
        if !self.skin.is_empty() {
            parts.push(format!("{} skin", self.skin));
        }
        if !self.build.is_empty() {
            parts.push(self.build.clone());
        }
        parts.extend(self.distinctive_features.iter().cloned());
        parts.join(", ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WritingStyle {
    #[serde(default)]
    pub avoid_openings: Vec<String>,
    #[serde(default)]
    pub exceptions: Vec<String>,
    #[serde(default)]
    pub preferred_phrases: Vec<String>,
    /// Named intensity dials, e.g. `sarcasm_level: 0.8`.
    #[serde(default)]
    pub tone_modifiers: BTreeMap<String, f64>,
}

/// Who the agent is and how it writes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Personality {
    pub name: String,
    pub handle: String,
    #[serde(default)]
    pub personality: PersonalityCore,
    #[serde(default)]
    pub physical_description: Option<PhysicalDescription>,
    #[serde(default)]
    pub behavioral_traits: Vec<String>,
    #[serde(default)]
    pub personality_traits: Vec<String>,
    #[serde(default)]
    pub writing_style: WritingStyle,
    /// Accounts whose posts get supportive replies.
    #[serde(default)]
    pub aligned_accounts: Vec<String>,
    /// System prompt used for replies.
    #[serde(default)]
    pub reply_system_prompt: Option<String>,
    /// Line included when the solidarity effect fires.
    #[serde(default)]
    pub solidarity_message: Option<String>,
}

impl Personality {
    pub fn load(path: &Path) -> Result<Self, ContentError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ContentError::Load {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&raw).map_err(|e| ContentError::Load {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn is_aligned(&self, account: &str) -> bool {
        let account = account.trim_start_matches('@');
        self.aligned_accounts
            .iter()
            .any(|a| a.trim_start_matches('@').eq_ignore_ascii_case(account))
    }

    pub fn tone_modifier(&self, key: &str, default: f64) -> f64 {
        self.writing_style
            .tone_modifiers
            .get(key)
            .copied()
            .unwrap_or(default)
    }

    /// `CHARACTERIZATION` block appended to prompts.
    pub fn characterization_prompt(&self) -> String {
        let mut prompt = String::from("\nCHARACTERIZATION:\n");

        if !self.personality.ffm_traits.is_empty() {
            let ffm = serde_json::to_string(&self.personality.ffm_traits).unwrap_or_default();
            prompt.push_str(&format!(
                "* Your personality core in the Five Factor Model (FFM) is: {}\n",
                ffm
            ));
        }

        if let Some(physical) = &self.physical_description {
            let rendered = physical.render();
            if !rendered.is_empty() {
                prompt.push_str(&format!("* Your physical description: {}\n", rendered));
            }
        }

        if !self.behavioral_traits.is_empty() {
            prompt.push_str(&format!(
                "* Your behavioral traits: {}\n",
                self.behavioral_traits.join(", ")
            ));
        }

        if !self.personality_traits.is_empty() {
            prompt.push_str(&format!(
                "* Your core traits: {}\n",
                self.personality_traits.join(", ")
            ));
        }

        let style = &self.writing_style;
        if !style.avoid_openings.is_empty() {
            let exceptions = if style.exceptions.is_empty() {
                String::new()
            } else {
                format!(" (except {})", style.exceptions.join(", "))
            };
            prompt.push_str(&format!(
                "* Do not start your messages with: {}{}\n",
                style.avoid_openings.join(", "),
                exceptions
            ));
        }

        prompt.push_str(&format!("* Remember you are {} ({})\n", self.name, self.handle));
        prompt
    }
}

fn join_nonempty(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Personality {
        serde_json::from_str(
            r#"{
                "name": "Chad",
                "handle": "@chad_onchain",
                "personality": {"ffm_traits": {"openness": 0.9}},
                "physical_description": {
                    "hair": {"style": "slicked-back", "color": "blond"},
                    "eyes": "blue",
                    "build": "athletic",
                    "distinctive_features": ["gold chain"]
                },
                "behavioral_traits": ["brash", "loud"],
                "writing_style": {
                    "avoid_openings": ["Ah,"],
                    "exceptions": ["Ahh"],
                    "tone_modifiers": {"sarcasm_level": 0.8}
                },
                "aligned_accounts": ["@GoldBug"]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_characterization_prompt() {
        let prompt = sample().characterization_prompt();
        assert!(prompt.starts_with("\nCHARACTERIZATION:\n"));
        assert!(prompt.contains(r#"{"openness":0.9}"#));
        assert!(prompt.contains(
            "* Your physical description: slicked-back blond hair, blue eyes, athletic, gold chain\n"
        ));
        assert!(prompt.contains("* Your behavioral traits: brash, loud\n"));
        assert!(prompt.contains("* Do not start your messages with: Ah, (except Ahh)\n"));
        assert!(prompt.ends_with("* Remember you are Chad (@chad_onchain)\n"));
        assert!(!prompt.contains("core traits"));
    }

    #[test]
    fn test_alignment_ignores_at_and_case() {
        let personality = sample();
        assert!(personality.is_aligned("goldbug"));
        assert!(personality.is_aligned("@GoldBug"));
        assert!(!personality.is_aligned("someone_else"));
    }

    #[test]
    fn test_tone_modifier_default() {
        let personality = sample();
        assert_eq!(personality.tone_modifier("sarcasm_level", 0.1), 0.8);
        assert_eq!(personality.tone_modifier("gold_enthusiasm", 0.9), 0.9);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Personality::load(Path::new("/nonexistent/personality.json")).unwrap_err();
        assert!(matches!(err, ContentError::Load { .. }));
    }
}
