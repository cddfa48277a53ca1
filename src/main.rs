use clap::{Parser, Subcommand};

mod commands;
mod output;
mod tty;

use commands::{roles, run, settings, tasks, GlobalArgs};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "stagehand")]
#[command(version = VERSION)]
#[command(about = "Run deployment recipe tasks on remote hosts over SSH")]
struct Cli {
    /// Recipe file (default: stagehand.{json,yml,yaml,toml} in the current directory)
    #[arg(long, global = true, env = "STAGEHAND_RECIPE")]
    recipe: Option<String>,

    /// Stage section of the recipe to merge (e.g. prod)
    #[arg(long, global = true, env = "STAGEHAND_STAGE")]
    stage: Option<String>,

    /// Override a setting (repeatable): --set branch=main
    #[arg(long = "set", global = true, value_name = "KEY=VALUE")]
    set: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Invoke a task on the hosts of its roles
    Run(run::RunArgs),
    /// List the tasks a recipe defines
    Tasks(tasks::TasksArgs),
    /// Show resolved settings and where each value came from
    Settings(settings::SettingsArgs),
    /// Show roles and their hosts
    Roles(roles::RolesArgs),
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let global = GlobalArgs {
        recipe: cli.recipe,
        stage: cli.stage,
        set: cli.set,
    };

    let (json_result, exit_code) = commands::run_json(cli.command, &global);
    if let Err(err) = output::print_json_result(json_result) {
        eprintln!("{}", err);
    }

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
