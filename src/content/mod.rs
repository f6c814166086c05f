//! Content generation: source material, personality, style effects and the
//! LLM-backed generator that blends them.

mod effects;
mod library;
mod mixer;
mod persona;

pub use effects::{EMOTIONS, EffectOdds, StyleEffects, TONES};
pub use library::{CandidatePost, ContentLibrary, ContentSource, Lore, write_author_file};
pub use mixer::{
    ContentGenerator, MixInputs, MixtureGenerator, mix_inputs, render_post_prompt,
    render_reply_prompt, replace_words, scramble_word_innards,
};
pub use persona::{Hair, Personality, PersonalityCore, PhysicalDescription, WritingStyle};
