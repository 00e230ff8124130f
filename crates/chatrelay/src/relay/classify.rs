//! Intent classification and cost tier selection

use regex::Regex;

use crate::config::{ControlSettings, PricingSettings};
use crate::error::{RelayError, Result};

use super::request::ModelHint;

/// What the client is asking for, derived once per message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Streamed chat completion
    Conversational,
    /// Single-shot image generation with the prompt that followed the cue
    ImageGeneration { prompt: String },
}

/// Price category applied to one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostTier {
    Standard,
    Advanced,
    ImageGeneration,
}

impl CostTier {
    /// Select the tier for a message. Image generation overrides the
    /// advanced/standard split; the advanced tier needs both the runtime flag
    /// and a connection that asked for it.
    pub fn select(intent: &Intent, hint: ModelHint, control: &ControlSettings) -> Self {
        match intent {
            Intent::ImageGeneration { .. } => CostTier::ImageGeneration,
            Intent::Conversational if control.enable_advanced && hint == ModelHint::Advanced => {
                CostTier::Advanced
            }
            Intent::Conversational => CostTier::Standard,
        }
    }

    /// Quota price of this tier
    pub fn price(&self, pricing: &PricingSettings) -> u64 {
        match self {
            CostTier::Standard => pricing.standard,
            CostTier::Advanced => pricing.advanced,
            CostTier::ImageGeneration => pricing.image,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CostTier::Standard => "standard",
            CostTier::Advanced => "advanced",
            CostTier::ImageGeneration => "image",
        }
    }
}

/// Recognizes drawing cues at the start of the prompt of record
#[derive(Debug, Clone)]
pub struct IntentClassifier {
    pattern: Option<Regex>,
}

impl IntentClassifier {
    /// Build a classifier from cue prefixes such as `/draw` or `画`.
    ///
    /// A cue ending in an ASCII letter or digit must be followed by
    /// whitespace or a colon so that `/drawing` is not read as `/draw`.
    pub fn new(cues: &[String]) -> Result<Self> {
        let pieces: Vec<String> = cues
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(|cue| {
                let escaped = regex::escape(cue);
                if cue.chars().last().is_some_and(|c| c.is_ascii_alphanumeric()) {
                    format!(r"{escaped}(?:\s+|\s*[:：]\s*)")
                } else {
                    format!(r"{escaped}\s*[:：]?\s*")
                }
            })
            .collect();

        if pieces.is_empty() {
            return Ok(Self { pattern: None });
        }

        let pattern = format!(r"(?is)^\s*(?:{})(?P<prompt>\S.*)$", pieces.join("|"));
        let regex = Regex::new(&pattern)
            .map_err(|e| RelayError::Config(format!("Invalid drawing cue pattern: {e}")))?;

        Ok(Self {
            pattern: Some(regex),
        })
    }

    /// Classify a prompt of record
    pub fn classify(&self, prompt: &str) -> Intent {
        let Some(pattern) = &self.pattern else {
            return Intent::Conversational;
        };

        match pattern.captures(prompt).and_then(|c| c.name("prompt")) {
            Some(m) => Intent::ImageGeneration {
                prompt: m.as_str().trim().to_string(),
            },
            None => Intent::Conversational,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> IntentClassifier {
        IntentClassifier::new(&["/draw".to_string(), "画".to_string()]).unwrap()
    }

    #[test]
    fn test_plain_prompt_is_conversational() {
        assert_eq!(classifier().classify("hello there"), Intent::Conversational);
    }

    #[test]
    fn test_draw_cue_extracts_prompt() {
        assert_eq!(
            classifier().classify("/draw a red fox in snow"),
            Intent::ImageGeneration {
                prompt: "a red fox in snow".to_string()
            }
        );
        assert_eq!(
            classifier().classify("  /DRAW: a lighthouse "),
            Intent::ImageGeneration {
                prompt: "a lighthouse".to_string()
            }
        );
    }

    #[test]
    fn test_cjk_cue_needs_no_separator() {
        assert_eq!(
            classifier().classify("画一只猫"),
            Intent::ImageGeneration {
                prompt: "一只猫".to_string()
            }
        );
    }

    #[test]
    fn test_cue_without_prompt_is_conversational() {
        assert_eq!(classifier().classify("/draw"), Intent::Conversational);
        assert_eq!(classifier().classify("/draw   "), Intent::Conversational);
    }

    #[test]
    fn test_cue_must_end_at_word_boundary() {
        assert_eq!(classifier().classify("/drawing tips"), Intent::Conversational);
    }

    #[test]
    fn test_cue_in_middle_is_conversational() {
        assert_eq!(
            classifier().classify("how do I /draw a circle"),
            Intent::Conversational
        );
    }

    #[test]
    fn test_no_cues_never_matches() {
        let classifier = IntentClassifier::new(&[]).unwrap();
        assert_eq!(classifier.classify("/draw a cat"), Intent::Conversational);
    }

    #[test]
    fn test_tier_selection() {
        let mut control = ControlSettings::default();
        let image = Intent::ImageGeneration {
            prompt: "cat".to_string(),
        };

        assert_eq!(
            CostTier::select(&Intent::Conversational, ModelHint::Advanced, &control),
            CostTier::Standard
        );

        control.enable_advanced = true;
        assert_eq!(
            CostTier::select(&Intent::Conversational, ModelHint::Advanced, &control),
            CostTier::Advanced
        );
        assert_eq!(
            CostTier::select(&Intent::Conversational, ModelHint::Standard, &control),
            CostTier::Standard
        );
        assert_eq!(
            CostTier::select(&image, ModelHint::Advanced, &control),
            CostTier::ImageGeneration
        );
    }

    #[test]
    fn test_tier_price() {
        let pricing = PricingSettings {
            standard: 5,
            advanced: 20,
            image: 8,
        };
        assert_eq!(CostTier::Standard.price(&pricing), 5);
        assert_eq!(CostTier::Advanced.price(&pricing), 20);
        assert_eq!(CostTier::ImageGeneration.price(&pricing), 8);
    }
}
