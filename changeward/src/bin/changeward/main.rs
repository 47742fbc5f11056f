mod commands;
mod output;
mod theme;

use anyhow::Result;
use clap::Parser;

use commands::{Commands, Connection, handle_command};
use output::{GlobalOptions, OutputFormat, OutputManager};

#[derive(Parser)]
#[command(name = "changeward")]
#[command(version)]
#[command(
    about = "Inspect and correct changeward change tracking",
    long_about = r#"Operator CLI for changeward deployments:

  status    Show the lock holder and the latest entry per change unit
  history   List every recorded change entry
  resolve   Mark a change unit as applied or rolled back by hand
"#
)]
#[command(subcommand_required = true, arg_required_else_help = true)]
struct Cli {
    /// Redis connection URL
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1/")]
    redis_url: String,

    /// Key prefix the migration driver was configured with
    #[arg(long, default_value = "changeward")]
    prefix: String,

    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    output: OutputFormat,

    /// Suppress output (only errors will be shown)
    #[arg(short = 'q', long)]
    quiet: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let output = OutputManager::new(GlobalOptions {
        output_format: cli.output,
        quiet: cli.quiet,
        no_color: cli.no_color,
    });

    if let Err(err) = execute(cli, &output).await {
        output.error(&format!("{err:#}"));
        std::process::exit(1);
    }
}

async fn execute(cli: Cli, output: &OutputManager) -> Result<()> {
    let connection = Connection {
        redis_url: &cli.redis_url,
        prefix: &cli.prefix,
    };
    handle_command(cli.command, &connection, output).await
}
