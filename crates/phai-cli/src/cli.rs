use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "phai")]
#[command(about = "Index a photo and video library and search it by description", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true, help = "TOML configuration file (defaults plus environment otherwise)")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Index every photo and video under a directory")]
    Index {
        #[arg(help = "Library root directory")]
        root: PathBuf,

        #[arg(long, help = "Re-embed every file instead of skipping unchanged ones")]
        full: bool,

        #[arg(long, help = "Print the report as JSON")]
        json: bool,
    },

    #[command(about = "Search the index with a natural-language description")]
    Search {
        #[arg(help = "What to look for, e.g. \"kids drawing at the kitchen table\"")]
        text: String,

        #[arg(short = 'k', long, help = "Maximum number of results")]
        limit: Option<usize>,

        #[arg(short, long, help = "Minimum cosine similarity in [-1, 1]")]
        threshold: Option<f32>,

        #[arg(long, help = "Print the results as JSON")]
        json: bool,
    },

    #[command(about = "Show index statistics")]
    Stats {
        #[arg(long, help = "Print the statistics as JSON")]
        json: bool,
    },

    #[command(about = "Show configuration")]
    Config {
        #[arg(long, help = "Show full configuration including defaults")]
        full: bool,
    },
}
