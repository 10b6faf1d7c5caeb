//! Host voice descriptions and the per-gender voice selection cache.

use serde::{Deserialize, Serialize};

use mriga_core::types::{VoiceGender, VoiceTag};

/// Name fragments that mark a vendor's premium voices.
const HIGH_QUALITY_MARKERS: &[&str] = &["google", "premium", "enhanced", "natural"];

/// A synthesis voice as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostVoice {
    pub name: String,
    /// BCP-47 language tag, e.g. `hi-IN`.
    pub language: String,
    pub tags: Vec<VoiceTag>,
}

impl HostVoice {
    pub fn new(name: impl Into<String>, language: impl Into<String>, tags: Vec<VoiceTag>) -> Self {
        Self {
            name: name.into(),
            language: language.into(),
            tags,
        }
    }

    /// Build a voice for hosts that only report names, deriving tags from
    /// whole words of the name (so "Female" never counts as "male").
    pub fn from_name(name: impl Into<String>, language: impl Into<String>) -> Self {
        let name = name.into();
        let mut tags = Vec::new();
        for word in name
            .split(|c: char| !c.is_alphanumeric())
            .map(str::to_lowercase)
        {
            let tag = match word.as_str() {
                "male" => Some(VoiceTag::Male),
                "female" => Some(VoiceTag::Female),
                w if HIGH_QUALITY_MARKERS.contains(&w) => Some(VoiceTag::HighQuality),
                _ => None,
            };
            if let Some(tag) = tag {
                if !tags.contains(&tag) {
                    tags.push(tag);
                }
            }
        }
        Self::new(name, language, tags)
    }

    pub fn has_tag(&self, tag: VoiceTag) -> bool {
        self.tags.contains(&tag)
    }

    pub fn speaks(&self, language: &str) -> bool {
        self.language.eq_ignore_ascii_case(language)
    }
}

/// Cache of the best voice per gender for one language.
///
/// Hosts often report an empty list first and the real one later, so the
/// cache stays unpopulated until a non-empty list arrives.
#[derive(Debug, Clone)]
pub struct VoiceCatalog {
    language: String,
    male: Option<HostVoice>,
    female: Option<HostVoice>,
    populated: bool,
}

impl VoiceCatalog {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            male: None,
            female: None,
            populated: false,
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn is_populated(&self) -> bool {
        self.populated
    }

    /// Recompute the per-gender picks from the host list.
    ///
    /// An empty list leaves the previous picks untouched.
    pub fn refresh(&mut self, voices: &[HostVoice]) {
        if voices.is_empty() {
            tracing::debug!("Host reported no voices yet");
            return;
        }
        self.male = self.best_for(voices, VoiceGender::Male);
        self.female = self.best_for(voices, VoiceGender::Female);
        self.populated = true;
        tracing::info!(
            language = %self.language,
            male = self.male.as_ref().map(|v| v.name.as_str()).unwrap_or("-"),
            female = self.female.as_ref().map(|v| v.name.as_str()).unwrap_or("-"),
            "Voice selection refreshed"
        );
    }

    /// Voice for `gender` (male when unset), falling back to the other
    /// gender's pick. `None` means the host default.
    pub fn select(&self, gender: Option<VoiceGender>) -> Option<&HostVoice> {
        let gender = gender.unwrap_or_default();
        self.pick(gender).or_else(|| self.pick(gender.opposite()))
    }

    fn pick(&self, gender: VoiceGender) -> Option<&HostVoice> {
        match gender {
            VoiceGender::Male => self.male.as_ref(),
            VoiceGender::Female => self.female.as_ref(),
        }
    }

    fn best_for(&self, voices: &[HostVoice], gender: VoiceGender) -> Option<HostVoice> {
        let tag = VoiceTag::from(gender);
        let mut candidates = voices
            .iter()
            .filter(|v| v.speaks(&self.language) && v.has_tag(tag));
        let first = candidates.clone().next();
        candidates
            .find(|v| v.has_tag(VoiceTag::HighQuality))
            .or(first)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voices() -> Vec<HostVoice> {
        vec![
            HostVoice::new("X Male", "hi-IN", vec![VoiceTag::Male]),
            HostVoice::new(
                "Google Y Female",
                "hi-IN",
                vec![VoiceTag::Female, VoiceTag::HighQuality],
            ),
        ]
    }

    #[test]
    fn test_selects_high_quality_female() {
        let mut catalog = VoiceCatalog::new("hi-IN");
        catalog.refresh(&voices());
        let voice = catalog.select(Some(VoiceGender::Female)).unwrap();
        assert_eq!(voice.name, "Google Y Female");
    }

    #[test]
    fn test_falls_back_to_male_when_no_female() {
        let mut catalog = VoiceCatalog::new("hi-IN");
        catalog.refresh(&[HostVoice::new("X Male", "hi-IN", vec![VoiceTag::Male])]);
        let voice = catalog.select(Some(VoiceGender::Female)).unwrap();
        assert_eq!(voice.name, "X Male");
    }

    #[test]
    fn test_gender_defaults_to_male() {
        let mut catalog = VoiceCatalog::new("hi-IN");
        catalog.refresh(&voices());
        assert_eq!(catalog.select(None).unwrap().name, "X Male");
    }

    #[test]
    fn test_high_quality_preferred_over_list_order() {
        let mut catalog = VoiceCatalog::new("hi-IN");
        catalog.refresh(&[
            HostVoice::new("Plain Male", "hi-IN", vec![VoiceTag::Male]),
            HostVoice::new("Premium Male", "hi-IN", vec![VoiceTag::Male, VoiceTag::HighQuality]),
        ]);
        assert_eq!(catalog.select(Some(VoiceGender::Male)).unwrap().name, "Premium Male");
    }

    #[test]
    fn test_other_languages_and_untagged_voices_ignored() {
        let mut catalog = VoiceCatalog::new("hi-IN");
        catalog.refresh(&[
            HostVoice::new("English Male", "en-US", vec![VoiceTag::Male]),
            HostVoice::new("Lekha", "hi-IN", vec![]),
        ]);
        assert!(catalog.is_populated());
        assert!(catalog.select(Some(VoiceGender::Male)).is_none());
    }

    #[test]
    fn test_empty_list_keeps_cache_unpopulated() {
        let mut catalog = VoiceCatalog::new("hi-IN");
        catalog.refresh(&[]);
        assert!(!catalog.is_populated());
        assert!(catalog.select(None).is_none());

        catalog.refresh(&voices());
        catalog.refresh(&[]);
        assert!(catalog.is_populated());
        assert_eq!(catalog.select(None).unwrap().name, "X Male");
    }

    #[test]
    fn test_language_match_ignores_case() {
        let mut catalog = VoiceCatalog::new("hi-IN");
        catalog.refresh(&[HostVoice::new("V Male", "HI-in", vec![VoiceTag::Male])]);
        assert!(catalog.select(None).is_some());
    }

    #[test]
    fn test_tags_from_name_use_whole_words() {
        let voice = HostVoice::from_name("Google हिन्दी Female", "hi-IN");
        assert_eq!(voice.tags, vec![VoiceTag::HighQuality, VoiceTag::Female]);
        assert!(!voice.has_tag(VoiceTag::Male));

        let voice = HostVoice::from_name("Microsoft Madhur (Natural) - Male", "hi-IN");
        assert!(voice.has_tag(VoiceTag::Male));
        assert!(voice.has_tag(VoiceTag::HighQuality));

        let voice = HostVoice::from_name("Lekha", "hi-IN");
        assert!(voice.tags.is_empty());
    }
}
