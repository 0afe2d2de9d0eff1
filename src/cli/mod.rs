use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::pipeline::RepairPolicy;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[value(alias = "google")]
    Gemini,
    #[value(name = "openai", alias = "open-ai")]
    #[serde(alias = "open-ai")]
    OpenAI,
    Ollama,
}

#[derive(Parser, Debug)]
#[command(name = "datapack_forge", version, about = "Generate, validate and package Minecraft datapacks from an idea")]
pub struct Args {
    /// TOML config file; flags below override it.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum, global = true)]
    pub provider: Option<ProviderKind>,

    #[arg(long, global = true)]
    pub model: Option<String>,

    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,

    #[arg(long, value_enum, global = true)]
    pub repair_policy: Option<RepairPolicy>,

    /// SQLite file for saved datapacks.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[arg(long, default_value_t = false, global = true)]
    pub save_request: bool,

    #[arg(long, default_value_t = false, global = true)]
    pub save_response: bool,

    #[arg(long, default_value_t = false, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the full pipeline and write the archive.
    Generate(GenerateArgs),
    /// Validate a datapack JSON file without calling a backend.
    Validate {
        file: PathBuf,
    },
    /// Print the prompt that would be sent.
    Prompt {
        #[arg(long)]
        idea: String,
        #[arg(long)]
        version: Option<String>,
    },
    /// List versions with dedicated prompt rules.
    Versions,
    /// Print a saved datapack.
    Show {
        id: String,
    },
    /// Serve the HTTP API.
    Serve {
        #[arg(long)]
        bind: Option<String>,
    },
}

#[derive(ClapArgs, Debug)]
pub struct GenerateArgs {
    #[arg(long)]
    pub idea: String,

    #[arg(long)]
    pub version: Option<String>,

    #[arg(long)]
    pub owner: Option<String>,

    /// Output file or directory; defaults to <pack name>.zip in the current directory.
    #[arg(long)]
    pub out: Option<PathBuf>,
}
