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

use crate::{GenerationConfig, LLMError, LLMResult, Provider};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider")]
    pub provider: Provider,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Name of the environment variable holding the API key, never the key itself.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub generation: GenerationConfig,
}

fn default_provider() -> Provider {
    Provider::Gemini
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_timeout_seconds() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    2
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            api_key_env: default_api_key_env(),
            timeout_seconds: default_timeout_seconds(),
            max_retries: default_max_retries(),
            generation: GenerationConfig::default(),
        }
    }
}

impl ProviderConfig {
    pub fn api_key(&self) -> LLMResult<String> {
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(LLMError::Authentication(format!(
                "environment variable {} is not set",
                self.api_key_env
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: ProviderConfig =
            serde_json::from_str(r#"{"provider": "ollama", "model": "llama3"}"#).unwrap();
        assert_eq!(config.provider, Provider::Ollama);
        assert_eq!(config.model, "llama3");
        assert_eq!(config.timeout_seconds, 120);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.api_key_env, "GEMINI_API_KEY");
    }

    #[test]
    fn unset_key_variable_is_an_authentication_error() {
        let config = ProviderConfig {
            api_key_env: "ORACLE_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..ProviderConfig::default()
        };
        assert!(matches!(config.api_key(), Err(LLMError::Authentication(_))));
    }
}
