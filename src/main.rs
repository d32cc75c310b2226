// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! spacey-amd CLI - resolve AMD modules from a directory tree

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use spacey_amd::{ConfigUpdate, FsLoader, HostMetadata, Loader, Mode, VERSION};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

#[derive(Parser)]
#[command(
    name = "spacey-amd",
    about = "Asynchronous module loader powered by Spacey",
    version = VERSION,
    author = "Pegasus Heavy Industries"
)]
struct Cli {
    /// Directory resources are served from
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base URL prefixed to relative request paths
    #[arg(long)]
    base_url: Option<String>,

    /// Module to require when no ids are given
    #[arg(long)]
    main: Option<String>,

    /// Cache-busting token, available to rewrite templates as {bust}
    #[arg(long)]
    bust: Option<String>,

    /// Named parameter for rewrite templates
    #[arg(short, long = "param", value_name = "NAME=VALUE", value_parser = parse_parameter)]
    parameters: Vec<(String, String)>,

    /// Use production mode
    #[arg(long)]
    production: bool,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve modules and print their values as JSON
    Require {
        /// Module ids
        ids: Vec<String>,
    },
    /// Show the requests a module would issue, without loading anything
    Plan {
        /// Module ids
        ids: Vec<String>,
    },
}

fn parse_parameter(arg: &str) -> Result<(String, String), String> {
    arg.split_once('=')
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", arg))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("spacey_amd=debug")
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("spacey_amd=warn")
            .init();
    }

    let meta = HostMetadata {
        base_url: cli.base_url.clone(),
        main: cli.main.clone(),
        bust: cli.bust.clone(),
        parameters: cli.parameters.iter().cloned().collect::<HashMap<_, _>>(),
    };

    debug!("Serving resources from {}", cli.root.display());
    let loader = Loader::new(FsLoader::new(&cli.root));
    if let Some(path) = &cli.config {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let update = ConfigUpdate::from_json(&json)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        loader.configure(update)?;
    }

    let mut update = ConfigUpdate::from(&meta);
    if cli.production {
        update = update.mode(Mode::Production);
    }
    loader.configure(update)?;

    let ids = match &cli.command {
        Command::Require { ids } | Command::Plan { ids } => ids.clone(),
    };
    let ids = match (ids.is_empty(), meta.main) {
        (false, _) => ids,
        (true, Some(main)) => vec![main],
        (true, None) => bail!("No module ids given and no --main module configured"),
    };

    match cli.command {
        Command::Require { .. } => require(&loader, ids).await,
        Command::Plan { .. } => plan(&loader, &ids),
    }
}

async fn require(loader: &Loader, ids: Vec<String>) -> anyhow::Result<()> {
    match loader.require(ids.clone()).await {
        Ok(values) => {
            for (id, value) in ids.iter().zip(values) {
                let json = serde_json::to_string_pretty(&value.to_json())?;
                println!("{} {}", id.cyan().bold(), json);
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn plan(loader: &Loader, ids: &[String]) -> anyhow::Result<()> {
    for id in ids {
        let plans = loader.plan(id)?;
        println!("{}", id.cyan().bold());
        for (index, plan) in plans.iter().enumerate() {
            let label = if index == 0 { "path" } else { "fallback" };
            println!(
                "  {:9} {} {}",
                label.dimmed(),
                plan.path.green(),
                plan.kind.element(&plan.path).dimmed()
            );
        }
    }
    Ok(())
}
