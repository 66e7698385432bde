// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Polyframe preview CLI

use anyhow::Result;
use clap::{Parser, Subcommand};
use polyframe_preview::cli::{logger, CompileOptions, Reporter, Runner};
use polyframe_preview::config::PipelineConfig;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "polyframe-preview")]
#[command(about = "Polyframe preview pipeline - compile OpenSCAD documents into render chains", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./polyframe.toml when present)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Override a top-level variable, e.g. -D size=10 (repeatable)
    #[arg(short = 'D', global = true, value_name = "NAME=VALUE")]
    define: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a document once and report its render chains
    Compile {
        /// Input SCAD file
        input: PathBuf,

        /// Print the instantiated tree
        #[arg(long)]
        dump_tree: bool,

        /// Print the flattened products of every chain
        #[arg(long)]
        dump_products: bool,

        /// Print a JSON report instead of the summary
        #[arg(long)]
        json: bool,
    },

    /// Render the exact geometry on the background worker
    Render {
        /// Input SCAD file
        input: PathBuf,
    },

    /// Recompile whenever the document or its dependencies change
    Watch {
        /// Input SCAD file
        input: PathBuf,

        /// Stop after this many polls that did work
        #[arg(long)]
        max_polls: Option<usize>,
    },

    /// Print the effective configuration
    Config,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        Reporter::report_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    logger::init(cli.verbose)?;
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Compile {
            input,
            dump_tree,
            dump_products,
            json,
        } => {
            let options = CompileOptions {
                dump_tree,
                dump_products,
                json,
            };
            Runner::open(&input, config)?
                .with_definitions(&cli.define)?
                .compile(&options)?;
        }
        Commands::Render { input } => {
            Runner::open(&input, config)?.with_definitions(&cli.define)?.render()?;
        }
        Commands::Watch { input, max_polls } => {
            Runner::open(&input, config)?
                .with_definitions(&cli.define)?
                .watch(max_polls)?;
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_file(path),
        None => PipelineConfig::load(),
    }
}
