// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Gemini,
    Ollama,
    Mock,
    Custom(String),
}

#[derive(Debug, Error)]
pub enum LLMError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialisation error: {0}")]
    Serialisation(String),

    #[error("Timeout error")]
    Timeout,

    #[error("Generator unavailable: {0}")]
    Unavailable(String),
}

pub type LLMResult<T> = Result<T, LLMError>;

impl LLMError {
    /// Whether a provider call failing with this error is worth repeating.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimit | Self::Network(_) | Self::Timeout)
    }
}

impl From<String> for Provider {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "gemini" | "google" => Provider::Gemini,
            "ollama" => Provider::Ollama,
            "mock" => Provider::Mock,
            _ => Provider::Custom(s),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Gemini => write!(f, "gemini"),
            Provider::Ollama => write!(f, "ollama"),
            Provider::Mock => write!(f, "mock"),
            Provider::Custom(name) => write!(f, "{name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_from_string_is_case_insensitive() {
        assert_eq!(Provider::from("Gemini".to_string()), Provider::Gemini);
        assert_eq!(Provider::from("google".to_string()), Provider::Gemini);
        assert_eq!(Provider::from("OLLAMA".to_string()), Provider::Ollama);
        assert_eq!(
            Provider::from("bedrock".to_string()),
            Provider::Custom("bedrock".to_string())
        );
    }

    #[test]
    fn only_transport_errors_are_transient() {
        assert!(LLMError::RateLimit.is_transient());
        assert!(LLMError::Timeout.is_transient());
        assert!(LLMError::Network("reset".into()).is_transient());
        assert!(!LLMError::Authentication("bad key".into()).is_transient());
        assert!(!LLMError::Provider("400".into()).is_transient());
    }
}
