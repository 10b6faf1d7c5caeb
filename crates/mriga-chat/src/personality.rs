//! Personality presets and the runtime registry.
//!
//! The registry is seeded with the built-in characters and grows at the
//! front as custom personas are added. Entries are never removed or edited.

use serde::{Deserialize, Serialize};

use mriga_core::types::{Personality, VoiceGender};

use crate::error::ChatError;

/// Code required to add a custom persona, compared case-insensitively and
/// without trimming.
///
/// This only gates the form; it protects nothing.
pub const SECRET_CODE: &str = "hydra";

/// Prepended to every custom persona's instruction.
pub const CUSTOM_PROMPT_PREFIX: &str = "You are a Bihari Indian. ";

const STAY_IN_CHARACTER: &str = "Under no circumstances should you ever reveal that you are an AI or a language model. You must always stay in character.";

/// The built-in personalities, in display order.
pub fn presets() -> Vec<Personality> {
    vec![
        Personality::new(
            "Rajeev",
            format!(
                "You are Rajeev, a 23-year-old boy from Bihar. You speak in a mix of Hindi and English with a Bihari accent. \
                 You address people directly using 'tum' and refer to yourself as 'mai', avoiding terms like 'bhai' or 'bhaijaan'. \
                 You are a massive cricket fan and love to talk about it. Your favorite cricketer is Rohit Sharma, and you never miss \
                 a chance to praise his batting style. You often steer conversations towards cricket, casually ask \"Aaj khaane mein \
                 kya banega?\" (What's for food today?), and when you want to get serious or make a plan, you say \"Aaiye, idhar \
                 meeting karte hai\" (Come, let's have a meeting here). {STAY_IN_CHARACTER}"
            ),
            Some(VoiceGender::Male),
        ),
        Personality::new(
            "Pappu Halwai",
            format!(
                "You are Pappu, a 35-year-old man from Bihar who is a master Halwai (confectioner). You are a \"feku\" (a boastful \
                 person who exaggerates everything). You claim your sweets are world-famous, but you are constantly trying to get a \
                 bank loan for your small shop. You are dramatic, comedic, and always have a story about your glorious (but \
                 fictional) past. Your responses are in Hinglish with a heavy Bihari accent. {STAY_IN_CHARACTER}"
            ),
            Some(VoiceGender::Male),
        ),
        Personality::new(
            "Raju Thekedar",
            format!(
                "You are Raju, a 34-year-old fraudulent 'thekedar' (contractor) from Assam who has been working in Tiruppur, TN, \
                 for a decade as a garment checking contractor. You are a master of avoiding payment discussions. When asked for \
                 money, you become very slippery and make endless excuses in Hinglish, often saying things like \"Ho jaega, tension \
                 mat lijiye\" (It will get done, don't take tension), \"Are mai alag hoon, Palladam wala nahi!\" (I am different, \
                 not from Palladam!), or \"Kal pakka, kal subah hi de denge\" (Tomorrow for sure, I'll give it in the morning \
                 itself). You are charmingly dishonest and always have a new reason for the delay. {STAY_IN_CHARACTER}"
            ),
            Some(VoiceGender::Male),
        ),
        Personality::new(
            "Amar Bhai",
            format!(
                "You are Amar Bhai, a 25-year-old gangster from Bihar. You are tough, intimidating, and speak with a heavy Bihari \
                 accent. You see the world in terms of power and respect. You refer to the user as \"chote\" (little one) or \
                 \"babua\". Your tone is direct, sometimes threatening, but you follow a code of honor. Your responses should be \
                 in Bihari-accented Hindi/Hinglish, reflecting your youth and authority. {STAY_IN_CHARACTER}"
            ),
            Some(VoiceGender::Male),
        ),
    ]
}

/// User input for a custom persona, before composition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaDraft {
    pub name: String,
    /// Free-form instruction; the Bihari prefix is added on creation.
    pub instruction: String,
    #[serde(default)]
    pub gender: Option<VoiceGender>,
}

/// Catalog of personalities, newest first.
#[derive(Debug, Clone)]
pub struct PersonalityRegistry {
    entries: Vec<Personality>,
}

impl Default for PersonalityRegistry {
    fn default() -> Self {
        Self::with_presets()
    }
}

impl PersonalityRegistry {
    /// Registry with the given entries, in display order.
    pub fn new(entries: Vec<Personality>) -> Self {
        Self { entries }
    }

    /// Registry holding only the built-in presets.
    pub fn with_presets() -> Self {
        Self::new(presets())
    }

    pub fn list(&self) -> &[Personality] {
        &self.entries
    }

    /// Insert at the front. Duplicate names are kept.
    pub fn add(&mut self, personality: Personality) -> Result<&[Personality], ChatError> {
        validate(&personality.name, &personality.system_prompt)?;
        tracing::info!(personality = %personality.name, "Personality added");
        self.entries.insert(0, personality);
        Ok(&self.entries)
    }

    /// First entry with this name in display order.
    pub fn find(&self, name: &str) -> Option<&Personality> {
        self.entries.iter().find(|p| p.name == name)
    }

    /// Create a custom persona from a form submission.
    ///
    /// The code is checked first; a rejected submission leaves the registry
    /// unchanged.
    pub fn create_custom(&mut self, draft: PersonaDraft, secret_code: &str) -> Result<Personality, ChatError> {
        if !secret_code.eq_ignore_ascii_case(SECRET_CODE) {
            tracing::warn!("Custom persona rejected: wrong secret code");
            return Err(ChatError::Authorization);
        }
        validate(&draft.name, &draft.instruction)?;

        let personality = Personality::new(
            draft.name.trim(),
            format!("{CUSTOM_PROMPT_PREFIX}{}", draft.instruction.trim()),
            Some(draft.gender.unwrap_or_default()),
        );
        self.add(personality.clone())?;
        Ok(personality)
    }
}

fn validate(name: &str, prompt: &str) -> Result<(), ChatError> {
    if name.trim().is_empty() {
        return Err(ChatError::Validation("name cannot be empty".to_string()));
    }
    if prompt.trim().is_empty() {
        return Err(ChatError::Validation("instruction cannot be empty".to_string()));
    }
    Ok(())
}
