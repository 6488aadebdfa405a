use std::{path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};

use error::CliError;
use list::*;
use serials::*;
use update::*;

mod error;
mod list;
mod serials;
mod update;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// update every attached camera with the newest firmware image
    Update {
        /// directory holding firmware .bin images
        #[clap(long, default_value = fleet::DEFAULT_FIRMWARE_DIR)]
        fw_dir: PathBuf,
        /// maximum number of concurrent flash operations
        #[clap(long, default_value_t = fleet::DEFAULT_MAX_CONCURRENT)]
        jobs: usize,
    },
    /// write the serial numbers of attached cameras to a file
    Serials {
        /// output file, one `#<index> <serial>` line per camera
        #[clap(long, default_value = "serials.txt")]
        output: PathBuf,
    },
    /// list attached cameras
    List {
        /// vendor ID (ex: "8086")
        #[clap(short, long, value_parser=hex_u16)]
        vendor: Option<u16>,
        /// product ID (ex: "0adb")
        #[clap(short, long, value_parser=hex_u16)]
        product: Option<u16>,
    },
}

impl Default for Commands {
    fn default() -> Self {
        Commands::Update {
            fw_dir: fleet::DEFAULT_FIRMWARE_DIR.into(),
            jobs: fleet::DEFAULT_MAX_CONCURRENT,
        }
    }
}

fn hex_u16(s: &str) -> Result<u16, String> {
    <u16>::from_str_radix(s, 16).map_err(|e| format!("{e}"))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    env_logger::init();

    if let Err(err) = match &cli.command.unwrap_or_default() {
        Commands::Update { fw_dir, jobs } => update_fleet(fw_dir, *jobs),
        Commands::Serials { output } => write_serials(output),
        Commands::List { vendor, product } => {
            list_cameras(*vendor, *product)
        }
    } {
        eprintln!("Error: {err}");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
