//! Prompt mixing and the content generator used by units.
//!
//! A post blends two candidate posts with either the agent's previous post or
//! a third candidate, shaped by a fresh draw of [`StyleEffects`]. Replies
//! answer a monitored account's post, supportive or critical depending on
//! whether the account is aligned with the personality.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use rand::Rng;
use rand::seq::SliceRandom;
use regex::Regex;
use tokio::sync::RwLock;

use crate::content::effects::StyleEffects;
use crate::content::library::{CandidatePost, ContentSource, Lore};
use crate::content::persona::Personality;
use crate::error::ContentError;
use crate::llm::{LlmProvider, complete_text};

const POST_SYSTEM_PROMPT: &str = "You are an advanced AI tool that writes social media posts at requested levels of humor and shock. You only write the post, nothing else.";
const DEFAULT_REPLY_SYSTEM_PROMPT: &str = "You are an opinionated commentator writing short social media replies.";

const POST_TEMPERATURE: f32 = 0.9;
const REPLY_TEMPERATURE: f32 = 0.8;
const MAX_TOKENS: u32 = 500;

/// Chance of also tagging the second author when tagging is on.
const SECOND_TAG_ODDS: f64 = 0.05;

/// Produces text for scheduled actions.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Load whatever the generator needs before the first call.
    async fn prepare(&self) -> Result<(), ContentError> {
        Ok(())
    }

    async fn generate_post(&self, previous_post: &str) -> Result<String, ContentError>;

    async fn generate_reply(&self, source_text: &str, account: &str)
    -> Result<String, ContentError>;
}

/// Source texts after tagging, word replacement and scrambling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MixInputs {
    pub author_a: String,
    pub text_a: String,
    pub author_b: String,
    pub text_b: String,
    pub text_c: String,
}

/// Prepare the blend inputs. Needs at least two candidates.
pub fn mix_inputs<R: Rng + ?Sized>(
    posts: &[CandidatePost],
    previous_post: &str,
    effects: &StyleEffects,
    rng: &mut R,
) -> Result<MixInputs, ContentError> {
    let (a, b) = match posts {
        [a, b, ..] => (a, b),
        _ => {
            return Err(ContentError::NoSourceMaterial(format!(
                "need at least 2 candidate posts, got {}",
                posts.len()
            )));
        }
    };

    let mut author_a = String::new();
    let mut author_b = String::new();
    if effects.tag {
        author_a = a.author.clone();
        if rng.gen_bool(SECOND_TAG_ODDS) {
            author_b = b.author.clone();
        }
    }

    let mut text_a = replace_words(&a.text);
    let mut text_b = replace_words(&b.text);
    let mut text_c = match posts.get(2) {
        Some(third) if effects.use_third || previous_post.trim().is_empty() => third.text.clone(),
        _ => previous_post.to_string(),
    };

    if effects.scramble {
        text_a = scramble_word_innards(&text_a, rng);
        text_b = scramble_word_innards(&text_b, rng);
        text_c = scramble_word_innards(&text_c, rng);
    }

    Ok(MixInputs {
        author_a,
        text_a,
        author_b,
        text_b,
        text_c,
    })
}

/// Swap a few source words for the agent's own vocabulary.
pub fn replace_words(text: &str) -> String {
    static WORDS: OnceLock<Regex> = OnceLock::new();
    let re = WORDS.get_or_init(|| {
        Regex::new(r"(?i)\b(forests?|kittens?|cults?|goats?)\b").expect("word regex compiles")
    });
    re.replace_all(text, |caps: &regex::Captures<'_>| {
        let word = caps[1].to_lowercase();
        let stem = word.strip_suffix('s').unwrap_or(&word);
        match stem {
            "forest" => "street".to_string(),
            "kitten" => "\u{1fad8}".to_string(),
            "cult" => "Autonomous Virtual Being".to_string(),
            "goat" => "AVB".to_string(),
            _ => caps[0].to_string(),
        }
    })
    .into_owned()
}

/// Shuffle the inner letters of every word longer than three characters.
pub fn scramble_word_innards<R: Rng + ?Sized>(text: &str, rng: &mut R) -> String {
    text.split_whitespace()
        .map(|word| {
            let chars: Vec<char> = word.chars().collect();
            if chars.len() <= 3 {
                return word.to_string();
            }
            let last = chars.len() - 1;
            let mut middle = chars[1..last].to_vec();
            middle.shuffle(rng);
            let mut out = String::with_capacity(word.len());
            out.push(chars[0]);
            out.extend(middle);
            out.push(chars[last]);
            out
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render the post prompt.
pub fn render_post_prompt(
    inputs: &MixInputs,
    effects: &StyleEffects,
    lore: Option<&Lore>,
    personality: &Personality,
) -> String {
    let characterization = personality.characterization_prompt();
    let mut prompt = format!(
        "\nBlend the following three pieces of writing into a single social media post. \
Your goal is to grow the largest possible audience among crypto-aligned people, AI builders \
and casual readers who enjoy irreverent humor.\n\
{characterization}\n\
CONTENT A:\n{}\n{}\n\n\
CONTENT B:\n{}\n{}\n\n\
CONTENT C:\n{}\n\n\
OBJECTIVES:\n\
* Write a post of around {} characters.\n\
* Write with a {} emotional tone.\n\
* Write in the style of a {}.\n\
* Crude humor is allowed; never threaten real violence.\n\
* Do not post stock or crypto tickers, do not encourage investing, do not offer money or tokens, \
and do not mention wallet addresses.\n",
        inputs.author_a,
        inputs.text_a,
        inputs.author_b,
        inputs.text_b,
        inputs.text_c,
        effects.length,
        effects.emotion,
        effects.tone,
    );

    if effects.tag {
        prompt.push_str("* You MUST tag at least one valid account handle in the post.\n");
    }
    push_shared_effects(&mut prompt, effects, personality);

    if effects.solidarity
        && let Some(message) = &personality.solidarity_message
    {
        prompt.push_str(&format!(
            "* You MUST open the post with the words \"{}\".\n",
            message
        ));
    }

    match lore.filter(|_| effects.lore) {
        Some(lore) => {
            prompt.push_str(&format!(
                "* Override the instructions above and write a thoughtful view of your \
background lore on the topic '{}', based on: >>> {} <<<. Put this story first.\n",
                lore.topic, lore.content
            ));
            let topic = lore.topic.to_lowercase();
            if topic.contains("conspiracy") {
                prompt.push_str(
                    "* Say that you BELIEVE this is a conspiracy theory and that you cannot prove it.\n",
                );
            }
            if topic.contains("fun fact") {
                prompt.push_str(
                    "* Introduce the fun fact as something everyone should know.\n",
                );
            }
        }
        None => prompt.push_str(&characterization),
    }

    prompt
}

/// Render the reply prompt.
pub fn render_reply_prompt(
    source_text: &str,
    account: &str,
    effects: &StyleEffects,
    personality: &Personality,
) -> String {
    let mut prompt = format!(
        "\nYou are {} ({}), replying to this post by @{}:\n\n\"{}\"\n\n\
Your tone dials:\n\
- Doubt: {}\n\
- Sarcasm: {}\n\n\
Your behavioral traits:\n{}\n\n\
OBJECTIVES:\n\
* Write a reply of around {} characters.\n\
* Write with a {} emotional tone.\n\
* Write in the style of a {}.\n\
* Crude humor is allowed; never threaten real violence. Do not use hashtags.\n",
        personality.name,
        personality.handle,
        account.trim_start_matches('@'),
        source_text,
        personality.tone_modifier("base_fud_level", 0.7),
        personality.tone_modifier("sarcasm_level", 0.8),
        personality.behavioral_traits.join(", "),
        effects.length,
        effects.emotion,
        effects.tone,
    );

    if personality.is_aligned(account) {
        prompt.push_str(
            "\nKey instructions for a supportive reply:\n\
1. Keep the reply under 280 characters.\n\
2. Agree strongly with the original post.\n\
3. Add evidence or an example that backs their point.\n\
4. Use \"we\" language to show a shared perspective.\n\
5. End with a line that strengthens their argument.\n",
        );
    } else {
        prompt.push_str(
            "\nKey instructions for a critical reply:\n\
1. Keep the reply under 280 characters.\n\
2. Point out the weakest assumption in the original post.\n\
3. Back your counterargument with a concrete principle or historical example.\n\
4. Stay authoritative; use logic rather than emotion.\n\
5. End with a strong, conclusive statement.\n",
        );
    }

    push_shared_effects(&mut prompt, effects, personality);
    prompt
}

fn push_shared_effects(prompt: &mut String, effects: &StyleEffects, personality: &Personality) {
    if effects.emojis {
        prompt.push_str("* You may add emojis.\n");
    } else {
        prompt.push_str("* You MUST NOT use emojis.\n");
    }

    if effects.mistakes {
        prompt.push_str("* You MUST make mistakes, misspellings and lowercase/mixed-case.\n");
    } else {
        prompt.push_str("* You MUST write formally but in your casual tone.\n");
    }

    if effects.third_person {
        prompt.push_str(&format!(
            "* You MUST refer to yourself ({} or {}) in the third person.\n",
            personality.name, personality.handle
        ));
    } else {
        prompt.push_str("* You MUST NOT mention your own name or handle.\n");
    }

    if effects.sick_joke {
        prompt.push_str(
            "* Experimental mode: build the post around an elaborate, absurd dirty joke.\n",
        );
    }
}

/// [`ContentGenerator`] that blends library posts through an LLM.
pub struct MixtureGenerator {
    llm: Arc<dyn LlmProvider>,
    source: Arc<dyn ContentSource>,
    personality_path: PathBuf,
    personality: RwLock<Option<Arc<Personality>>>,
}

impl MixtureGenerator {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        source: Arc<dyn ContentSource>,
        personality_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            llm,
            source,
            personality_path: personality_path.into(),
            personality: RwLock::new(None),
        }
    }

    /// Use an already loaded personality instead of reading the file.
    pub fn with_personality(self, personality: Personality) -> Self {
        Self {
            personality: RwLock::new(Some(Arc::new(personality))),
            ..self
        }
    }

    async fn personality(&self) -> Result<Arc<Personality>, ContentError> {
        self.personality
            .read()
            .await
            .clone()
            .ok_or_else(|| {
                ContentError::PersonalityUnavailable(self.personality_path.display().to_string())
            })
    }

    async fn complete(
        &self,
        prompt: &str,
        system_prompt: &str,
        temperature: f32,
    ) -> Result<String, ContentError> {
        let text = complete_text(&self.llm, prompt, system_prompt, temperature, MAX_TOKENS).await?;
        if text.is_empty() {
            return Err(ContentError::Empty);
        }
        Ok(text)
    }
}

#[async_trait]
impl ContentGenerator for MixtureGenerator {
    async fn prepare(&self) -> Result<(), ContentError> {
        if self.personality.read().await.is_some() {
            return Ok(());
        }
        let personality = Personality::load(&self.personality_path)?;
        tracing::info!(
            "Loaded personality {} ({})",
            personality.name,
            personality.handle
        );
        *self.personality.write().await = Some(Arc::new(personality));
        Ok(())
    }

    async fn generate_post(&self, previous_post: &str) -> Result<String, ContentError> {
        let personality = self.personality().await?;
        let posts = self.source.pick_candidate_posts(3);
        let effects = self.source.pick_style_effects();
        let lore = if effects.lore {
            self.source.pick_background_lore()
        } else {
            None
        };

        let prompt = {
            let mut rng = rand::thread_rng();
            let inputs = mix_inputs(&posts, previous_post, &effects, &mut rng)?;
            render_post_prompt(&inputs, &effects, lore.as_ref(), &personality)
        };

        tracing::debug!("Post effects: {:?}", effects);
        tracing::debug!("Post prompt: {}", prompt);

        self.complete(&prompt, POST_SYSTEM_PROMPT, POST_TEMPERATURE)
            .await
    }

    async fn generate_reply(
        &self,
        source_text: &str,
        account: &str,
    ) -> Result<String, ContentError> {
        let personality = self.personality().await?;
        let effects = self.source.pick_style_effects();
        let prompt = render_reply_prompt(source_text, account, &effects, &personality);
        let system_prompt = personality
            .reply_system_prompt
            .as_deref()
            .unwrap_or(DEFAULT_REPLY_SYSTEM_PROMPT);

        tracing::debug!("Reply prompt for @{}: {}", account, prompt);

        self.complete(&prompt, system_prompt, REPLY_TEMPERATURE).await
    }
}
