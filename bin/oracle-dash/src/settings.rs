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

//! Layered settings: built-in defaults, an optional `oracle-dash.toml`,
//! `ORACLE_*` environment variables, then command-line overrides.

use config::{Config, ConfigError, Environment, File};
use llm_contracts::ProviderConfig;
use serde::{Deserialize, Serialize};
use sleet::PipelineConfig;
use std::path::Path;

pub const DEFAULT_CONFIG_FILE: &str = "oracle-dash";
pub const ENV_PREFIX: &str = "ORACLE";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub provider: ProviderConfig,
    pub pipeline: PipelineConfig,
}

/// Values given on the command line; these win over file and environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub provider: Option<String>,
    pub model: Option<String>,
}

impl Settings {
    /// `path` names the settings file without requiring it to exist; the
    /// extension may be omitted.
    pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<Self, ConfigError> {
        let file = path
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());

        let builder = Config::builder()
            .add_source(File::with_name(&file).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("provider.provider", overrides.provider.clone())?
            .set_override_option("provider.model", overrides.model.clone())?;

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm_contracts::Provider;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let settings = Settings::load(Some(&path), &Overrides::default()).unwrap();
        assert_eq!(settings.provider.provider, Provider::Gemini);
        assert_eq!(settings.pipeline, PipelineConfig::default());
    }

    #[test]
    fn file_values_and_overrides_are_layered() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[provider]\nprovider = \"ollama\"\nmodel = \"llama3\"\n\n[pipeline]\nmax_steps = 1000\n"
        )
        .unwrap();

        let overrides = Overrides {
            provider: None,
            model: Some("qwen2".to_string()),
        };
        let settings = Settings::load(Some(file.path()), &overrides).unwrap();
        assert_eq!(settings.provider.provider, Provider::Ollama);
        assert_eq!(settings.provider.model, "qwen2");
        assert_eq!(settings.pipeline.max_steps, 1000);
        assert_eq!(settings.pipeline.sample_rows, estel::SAMPLE_ROWS);
    }
}
