use std::path::PathBuf;

use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand, ValueEnum};
use classpilot_server::DocumentKind;

/// Top-level CLI entry point.
#[derive(Debug, Default, Parser)]
#[command(
    name = "classpilot",
    version,
    author,
    about = "Lecture plans and teaching feedback from a chat-completion service"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
    /// Increase logging verbosity (-v, -vv, -vvv).
    #[arg(global = true, short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn print_help() {
        let mut cmd = Cli::command();
        let _ = cmd.print_help();
        println!();
    }
}

/// Supported subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the HTTP API server.
    Serve(ServeArgs),
    /// Print the prompt built for a form, without calling the completion service.
    Prompt(PromptArgs),
    /// Parse a saved completion text and print the structured document as JSON.
    Render(RenderArgs),
    /// Build the prompt, call the completion service and print the result.
    Generate(GenerateArgs),
}

#[derive(Debug, Args)]
pub struct ServeArgs;

/// Document kind as spelled on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    LecturePlan,
    Feedback,
}

impl From<KindArg> for DocumentKind {
    fn from(value: KindArg) -> Self {
        match value {
            KindArg::LecturePlan => DocumentKind::LecturePlan,
            KindArg::Feedback => DocumentKind::Feedback,
        }
    }
}

#[derive(Debug, Args)]
pub struct PromptArgs {
    #[arg(long, value_enum)]
    pub kind: KindArg,
    /// JSON file holding the classroom form.
    #[arg(long, value_name = "FILE.json")]
    pub form: PathBuf,
}

#[derive(Debug, Args)]
pub struct RenderArgs {
    #[arg(long, value_enum)]
    pub kind: KindArg,
    /// Completion text to parse.
    #[arg(value_name = "FILE")]
    pub input: PathBuf,
}

#[derive(Debug, Args)]
pub struct GenerateArgs {
    #[arg(long, value_enum)]
    pub kind: KindArg,
    /// JSON file holding the classroom form.
    #[arg(long, value_name = "FILE.json")]
    pub form: PathBuf,
    /// Print the completion text instead of the rendered document.
    #[arg(long)]
    pub raw: bool,
}
