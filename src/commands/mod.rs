use stagehand::recipe::{self, LoadOptions, Recipe};

pub type CmdResult<T> = stagehand::Result<(T, i32)>;

/// Flags shared by every subcommand.
pub(crate) struct GlobalArgs {
    pub recipe: Option<String>,
    pub stage: Option<String>,
    pub set: Vec<String>,
}

/// Load the recipe named by `--recipe` (or the default file in the current
/// directory) with `STAGEHAND_*` and `--set` values applied.
pub(crate) fn load_recipe(global: &GlobalArgs) -> stagehand::Result<Recipe> {
    let path = match &global.recipe {
        Some(path) => std::path::PathBuf::from(shellexpand::tilde(path).as_ref()),
        None => {
            let cwd = std::env::current_dir().map_err(|e| {
                stagehand::Error::internal_io(e.to_string(), Some("get current dir".to_string()))
            })?;
            recipe::find_recipe(&cwd)?
        }
    };

    let overrides = global
        .set
        .iter()
        .map(|arg| recipe::parse_override(arg))
        .collect::<stagehand::Result<Vec<_>>>()?;

    let options = LoadOptions {
        stage: global.stage.clone(),
        env: recipe::env_overrides(std::env::vars()),
        overrides,
    };

    recipe::load(&path, &options)
}

pub mod roles;
pub mod run;
pub mod settings;
pub mod tasks;

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (stagehand::Result<serde_json::Value>, i32) {
    crate::tty::status("stagehand is working...");

    match command {
        crate::Commands::Run(args) => dispatch!(args, global, run),
        crate::Commands::Tasks(args) => dispatch!(args, global, tasks),
        crate::Commands::Settings(args) => dispatch!(args, global, settings),
        crate::Commands::Roles(args) => dispatch!(args, global, roles),
    }
}
