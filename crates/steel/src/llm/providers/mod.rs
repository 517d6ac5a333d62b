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

pub mod gemini;
pub mod ollama;

pub use gemini::GeminiClient;
pub use ollama::OllamaClient;

use llm_contracts::{LLMError, LLMResult, Provider, ProviderConfig, TextGenerator};
use tracing::info;

/// Builds the configured provider behind the generator trait.
pub fn build_generator(config: &ProviderConfig) -> LLMResult<Box<dyn TextGenerator>> {
    info!(provider = %config.provider, model = %config.model, "Building text generator");
    match &config.provider {
        Provider::Gemini => Ok(Box::new(GeminiClient::new(config)?)),
        Provider::Ollama => Ok(Box::new(OllamaClient::new(config)?)),
        Provider::Mock => Err(LLMError::Configuration(
            "the mock provider has no transport; use the pipeline's mock generator".to_string(),
        )),
        Provider::Custom(name) => Err(LLMError::Configuration(format!(
            "unsupported provider: {name}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_providers_are_rejected() {
        let config = ProviderConfig {
            provider: Provider::Custom("bedrock".to_string()),
            ..ProviderConfig::default()
        };
        assert!(matches!(
            build_generator(&config),
            Err(LLMError::Configuration(message)) if message.contains("bedrock")
        ));
    }

    #[test]
    fn ollama_needs_no_key() {
        let config = ProviderConfig {
            provider: Provider::Ollama,
            api_key_env: "STEEL_KEY_THAT_IS_NEVER_SET".to_string(),
            ..ProviderConfig::default()
        };
        let generator = build_generator(&config).unwrap();
        assert_eq!(generator.name(), "ollama");
    }
}
