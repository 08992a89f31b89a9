//! CLI surface (spec §6, external collaborator): open a store over a
//! directory backend, walk a source directory copying files in, stat a
//! path, and cat a file back out. Ported from the teacher's `cli.rs`
//! argument layout onto the new `Store` facade.

use clap::builder::styling::AnsiColor;
use clap::builder::Styles;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

const CLAP_STYLING: Styles = Styles::styled()
    .header(AnsiColor::BrightGreen.on_default().bold())
    .usage(AnsiColor::BrightGreen.on_default().bold())
    .literal(AnsiColor::BrightCyan.on_default().bold())
    .placeholder(AnsiColor::BrightCyan.on_default());

#[derive(Parser)]
#[command(name = "bltfs")]
#[command(about = "A block-emulated LTFS engine CLI")]
#[command(version)]
#[command(author = "lance <oplancelot@gmail.com>")]
#[command(styles = CLAP_STYLING)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Open (and format, if empty) a directory-backed volume
    Open {
        /// Directory emulating the tape cartridge
        #[arg(short = 't', long = "tape", value_name = "ROOT")]
        tape_root: PathBuf,

        /// Directory holding the binary index
        #[arg(short = 'i', long = "index", value_name = "DIR")]
        index_dir: PathBuf,
    },

    /// Walk a source directory, copying every file into the volume
    CopyIn {
        #[arg(short = 't', long = "tape", value_name = "ROOT")]
        tape_root: PathBuf,

        #[arg(short = 'i', long = "index", value_name = "DIR")]
        index_dir: PathBuf,

        /// Source directory to copy
        source: PathBuf,

        /// Destination path inside the volume
        #[arg(short = 'o', long = "output", value_name = "DEST", default_value = "/")]
        destination: String,
    },

    /// Stat a path inside the volume
    Stat {
        #[arg(short = 't', long = "tape", value_name = "ROOT")]
        tape_root: PathBuf,

        #[arg(short = 'i', long = "index", value_name = "DIR")]
        index_dir: PathBuf,

        path: String,
    },

    /// Print a file's contents to stdout
    Cat {
        #[arg(short = 't', long = "tape", value_name = "ROOT")]
        tape_root: PathBuf,

        #[arg(short = 'i', long = "index", value_name = "DIR")]
        index_dir: PathBuf,

        path: String,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
