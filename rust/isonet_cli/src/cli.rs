use clap::{
    Parser,
    Subcommand,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Correct raw isotopologue intensities for natural abundance.
    Correct(CorrectArgs),
    /// Build the contextualization network from a MID table.
    Contextualize(ContextualizeArgs),
    /// Write a template configuration file.
    WriteTemplate(WriteTemplateArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct CorrectArgs {
    /// Long format raw intensity table (csv, or tsv by extension).
    #[arg(short, long)]
    pub input: PathBuf,

    /// Where to write the corrected MID table.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Json file with the configuration.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Condition label of the unlabeled controls, overrides the config.
    #[arg(long)]
    pub control_label: Option<String>,

    /// Abort on the first metabolite that cannot be corrected.
    #[arg(long, default_value_t = false)]
    pub strict: bool,

    /// Number of worker threads, defaults to all but two cores.
    #[arg(long)]
    pub core_count: Option<usize>,

    /// Identifier attached to progress messages.
    #[arg(long, default_value = "isonet")]
    pub session_id: String,
}

#[derive(Parser, Debug, Clone)]
pub struct ContextualizeArgs {
    /// Long format MID table, as written by `correct`.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Optional pathway graph (json) to merge into the network.
    #[arg(short, long)]
    pub pathway: Option<PathBuf>,

    /// Where to write the network graph json.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Json file with the configuration.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Seed for the null model simulations, overrides the config.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Number of worker threads, defaults to all but two cores.
    #[arg(long)]
    pub core_count: Option<usize>,

    /// Identifier attached to progress messages.
    #[arg(long, default_value = "isonet")]
    pub session_id: String,
}

#[derive(Parser, Debug)]
pub struct WriteTemplateArgs {
    /// The directory to write the template to.
    #[arg(short, long)]
    pub output_path: PathBuf,
}
