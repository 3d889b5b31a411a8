// SPDX-License-Identifier: MIT

//! Command-line interface definitions.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands;

/// Command-line arguments.
#[derive(Parser)]
#[command(name = "vibra-upload")]
#[command(about = "Firmware packaging and update simulation for vibra devices")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Show firmware image size, CRC and bank fit
    Info {
        /// Firmware binary file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Generate the OTA packet stream for a firmware image
    Packets {
        /// Firmware binary file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Payload bytes per DATA packet
        #[arg(short, long, default_value = "180")]
        mtu: usize,

        /// Firmware version number carried in START
        #[arg(short, long, default_value = "1")]
        version: u8,

        /// Output file (length-prefixed packets); stdout hex dump if omitted
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Run a firmware image through the update engine in memory
    Simulate {
        /// Firmware binary file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Firmware version number carried in START
        #[arg(short, long, default_value = "1")]
        version: u8,

        /// Payload bytes per DATA packet
        #[arg(short, long, default_value = "180")]
        mtu: usize,
    },
}

/// Execute the parsed CLI command.
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Info { file } => commands::info(&file),
        Commands::Packets {
            file,
            mtu,
            version,
            out,
        } => commands::packets(&file, mtu, version, out.as_deref()),
        Commands::Simulate { file, version, mtu } => commands::simulate(&file, version, mtu),
    }
}
