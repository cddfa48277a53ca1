use clap::Args;
use serde::Serialize;

use stagehand::Host;

use super::{load_recipe, CmdResult, GlobalArgs};

#[derive(Args)]
pub struct RolesArgs {
    /// Show only this role
    pub role: Option<String>,
}

#[derive(Serialize)]
pub struct RoleOutput {
    name: String,
    hosts: Vec<Host>,
}

#[derive(Serialize)]
pub struct RolesOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    stage: Option<String>,
    roles: Vec<RoleOutput>,
}

pub fn run(args: RolesArgs, global: &GlobalArgs) -> CmdResult<RolesOutput> {
    let recipe = load_recipe(global)?;

    let roles = match args.role {
        Some(name) => vec![RoleOutput {
            hosts: recipe.roles.role(&name)?.to_vec(),
            name,
        }],
        None => recipe
            .roles
            .iter()
            .map(|(name, hosts)| RoleOutput {
                name: name.clone(),
                hosts: hosts.clone(),
            })
            .collect(),
    };

    Ok((
        RolesOutput {
            stage: recipe.stage,
            roles,
        },
        0,
    ))
}
