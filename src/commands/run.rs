use clap::Args;

use stagehand::task::{RunReport, Runner};
use stagehand::Executor;

use super::{load_recipe, CmdResult, GlobalArgs};

#[derive(Args)]
pub struct RunArgs {
    /// Fully-qualified task name (e.g. airflow:restart)
    pub task: String,

    /// Log commands instead of connecting to hosts
    #[arg(long)]
    pub dry_run: bool,
}

pub fn run(args: RunArgs, global: &GlobalArgs) -> CmdResult<RunReport> {
    let recipe = load_recipe(global)?;

    let mut executor = if args.dry_run {
        Executor::dry_run()
    } else {
        Executor::ssh()?
    };

    let report = Runner::new(
        &recipe.tasks,
        &recipe.settings,
        &recipe.roles,
        &mut executor,
    )
    .run(&args.task)?;

    Ok((report, 0))
}
