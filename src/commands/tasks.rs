use clap::Args;
use serde::Serialize;

use stagehand::task::TaskSummary;

use super::{load_recipe, CmdResult, GlobalArgs};

#[derive(Args)]
pub struct TasksArgs {
    /// Only list tasks under this namespace (e.g. airflow)
    #[arg(long)]
    pub namespace: Option<String>,
}

#[derive(Serialize)]
pub struct TasksOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    stage: Option<String>,
    tasks: Vec<TaskSummary>,
}

pub fn run(args: TasksArgs, global: &GlobalArgs) -> CmdResult<TasksOutput> {
    let recipe = load_recipe(global)?;

    let prefix = args.namespace.map(|ns| format!("{}:", ns));
    let tasks = recipe
        .tasks
        .summaries()
        .into_iter()
        .filter(|task| match &prefix {
            Some(prefix) => task.name.starts_with(prefix.as_str()),
            None => true,
        })
        .collect();

    Ok((
        TasksOutput {
            stage: recipe.stage,
            tasks,
        },
        0,
    ))
}
