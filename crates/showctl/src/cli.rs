use clap::{Parser, Subcommand};

/// Showrunner CLI - drive multi-agent pipelines from the terminal
#[derive(Parser, Debug)]
#[command(name = "showctl")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Engine configuration file (JSON)
    #[arg(long, short = 'c', global = true, env = "SHOWRUNNER_CONFIG", default_value = "showrunner.json")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a workflow from a manifest
    Run {
        /// Workflow manifest file (YAML or JSON)
        #[arg(short, long)]
        manifest: String,

        /// Workflow name; defaults to the manifest's first workflow
        #[arg(short, long)]
        workflow: Option<String>,

        /// Input entries as key=value; values parse as JSON when possible
        #[arg(short, long)]
        input: Vec<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        output: String,

        /// Print router statistics after the run
        #[arg(long)]
        stats: bool,
    },

    /// Validate configuration and manifest without calling any provider
    Validate {
        /// Workflow manifest file (YAML or JSON)
        #[arg(short, long)]
        manifest: Option<String>,
    },

    /// Show the function routing table and provider availability
    Functions,
}
