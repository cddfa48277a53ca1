use clap::Args;
use serde::Serialize;

use stagehand::settings::SettingEntry;

use super::{load_recipe, CmdResult, GlobalArgs};

#[derive(Args)]
pub struct SettingsArgs {
    /// Show a single setting (fails when it cannot be resolved)
    pub name: Option<String>,
}

#[derive(Serialize)]
pub struct SettingsOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    stage: Option<String>,
    settings: Vec<SettingEntry>,
}

pub fn run(args: SettingsArgs, global: &GlobalArgs) -> CmdResult<SettingsOutput> {
    let recipe = load_recipe(global)?;

    let settings = match args.name {
        Some(name) => {
            let value = recipe.settings.fetch(&name)?;
            let provenance = recipe.settings.provenance(&name).ok_or_else(|| {
                stagehand::Error::internal_unexpected(format!("No provenance for '{}'", name))
            })?;
            vec![SettingEntry {
                name,
                value,
                provenance,
            }]
        }
        None => recipe.settings.entries(),
    };

    Ok((
        SettingsOutput {
            stage: recipe.stage,
            settings,
        },
        0,
    ))
}
