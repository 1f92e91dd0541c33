//! Named model orderings
//!
//! A [`Strategy`] expresses a latency/quality preference as an ordered list of
//! model identifiers. It says nothing about which credentials are configured;
//! models whose vendor is missing simply fail when the strategy is walked.

use serde::{Deserialize, Serialize};

pub const QUALITY: &str = "quality";
pub const LATENCY: &str = "latency";

const QUALITY_MODELS: &[&str] = &[
    "claude-sonnet-4-5",
    "gpt-4o",
    "gemini-2.5-pro",
    "llama-3.3-70b-versatile",
];

const LATENCY_MODELS: &[&str] = &[
    "llama-3.1-8b-instant",
    "gemini-2.0-flash",
    "gpt-4o-mini",
    "claude-3-5-haiku-latest",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Strategy {
    pub name: String,
    pub models: Vec<String>,
}

impl Strategy {
    pub fn new(name: impl Into<String>, models: Vec<String>) -> Self {
        Self {
            name: name.into(),
            models,
        }
    }

    fn from_static(name: &str, models: &[&str]) -> Self {
        Self::new(name, models.iter().map(|m| m.to_string()).collect())
    }

    /// Most capable models first
    pub fn quality_first() -> Self {
        Self::from_static(QUALITY, QUALITY_MODELS)
    }

    /// Fastest models first
    pub fn latency_first() -> Self {
        Self::from_static(LATENCY, LATENCY_MODELS)
    }

    /// All built-in presets
    pub fn presets() -> Vec<Strategy> {
        vec![Self::quality_first(), Self::latency_first()]
    }

    /// Look up a built-in preset by name
    pub fn preset(name: &str) -> Option<Strategy> {
        match name.to_ascii_lowercase().as_str() {
            "quality" | "quality-first" | "quality_first" => Some(Self::quality_first()),
            "latency" | "latency-first" | "latency_first" | "fast" => Some(Self::latency_first()),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }
}
