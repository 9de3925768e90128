mod cli;
mod paths;
mod presets;
mod run;

use anyhow::Result;
use cli::Command;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Some(Command::Presets(args)) => run::list_presets(args),
        None => run::run(cli.run),
    }
}
