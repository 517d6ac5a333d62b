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
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use oracle_dash::{init_tracing, GenerateOptions, Overrides, Settings};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "oracle-dash", about = "Turn a CSV into an AI-generated dashboard")]
struct Cli {
    /// Settings file; defaults to ./oracle-dash.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    provider: Option<String>,

    #[arg(long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Run blueprint, code generation, aggregation and assembly.
    Generate {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long)]
        out: PathBuf,
        /// Serve the canned demo dashboard without calling a model.
        #[arg(long)]
        mock: bool,
        #[arg(long, value_name = "JSON")]
        data_out: Option<PathBuf>,
        #[arg(long, value_name = "MD")]
        blueprint_out: Option<PathBuf>,
    },

    Summary {
        #[arg(long)]
        csv: PathBuf,
    },

    /// One chat turn against the dataset.
    Chat {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long)]
        message: String,
    },
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();
    let cli = Cli::parse();

    let overrides = Overrides {
        provider: cli.provider,
        model: cli.model,
    };
    let settings =
        Settings::load(cli.config.as_deref(), &overrides).context("failed to load settings")?;

    match cli.cmd {
        Command::Generate {
            csv,
            out,
            mock,
            data_out,
            blueprint_out,
        } => {
            let options = GenerateOptions {
                csv,
                out,
                mock,
                data_out,
                blueprint_out,
            };
            oracle_dash::generate(&settings, &options)?;
        }
        Command::Summary { csv } => {
            let report = oracle_dash::summary(&csv)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Chat { csv, message } => {
            let response = oracle_dash::chat(&settings, &csv, &message)?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }
    Ok(())
}
