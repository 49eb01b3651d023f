pub mod bootstrap;
pub mod commands;
pub mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "handset",
    about = "Handset sales assistant operator CLI",
    long_about = "Run assistant turns, query the catalog, inspect configuration, and check readiness.",
    after_help = "Examples:\n  handset chat --message \"show me a Samsung phone\"\n  handset search pixel\n  handset doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run one assistant turn and print the resolved answer as JSON")]
    Chat {
        #[arg(long, short, help = "New customer message")]
        message: String,
        #[arg(long, help = "JSON file of prior turns, each {\"role\": .., \"content\": ..}")]
        history: Option<PathBuf>,
        #[arg(long, help = "JSON file with the context_products printed by a previous turn")]
        context: Option<PathBuf>,
        #[arg(long, help = "Conversation identifier recorded in logs and audit events")]
        conversation_id: Option<String>,
        #[arg(long, help = "Pretty-print the JSON output")]
        pretty: bool,
    },
    #[command(about = "Search the product catalog and print complete bundles")]
    Search {
        query: String,
        #[arg(long, help = "Override the configured number of results")]
        top_k: Option<usize>,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, tool registry, catalog, and LLM endpoint readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Chat { message, history, context, conversation_id, pretty } => {
            commands::chat::run(commands::chat::ChatArgs {
                message,
                history,
                context,
                conversation_id,
                pretty,
            })
        }
        Command::Search { query, top_k } => commands::search::run(&query, top_k),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
