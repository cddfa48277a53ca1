//! Recipe files: settings, roles, stages and task definitions.
//!
//! A recipe is read once at startup into [`Settings`], [`RoleRegistry`] and
//! [`TaskGraph`]. Everything a task body needs from the settings store is
//! checked here, before any host is contacted.

use heck::ToSnakeCase;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::roles::{Host, RoleRegistry};
use crate::settings::{SettingValue, Settings};
use crate::ssh::execute_local_command;
use crate::task::{TaskBody, TaskContext, TaskGraph};
use crate::utils::template;

/// Environment variables with this prefix become caller-provided settings.
pub const ENV_PREFIX: &str = "STAGEHAND_";

/// `STAGEHAND_*` variables read by the CLI itself rather than the recipe.
const RESERVED_ENV: &[&str] = &["RECIPE", "STAGE"];

/// Looked up in this order when no recipe path is given.
pub const DEFAULT_RECIPE_FILES: &[&str] = &[
    "stagehand.json",
    "stagehand.yml",
    "stagehand.yaml",
    "stagehand.toml",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeFormat {
    Json,
    Yaml,
    Toml,
}

impl RecipeFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecipeFormat::Json => "json",
            RecipeFormat::Yaml => "yaml",
            RecipeFormat::Toml => "toml",
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Ok(RecipeFormat::Json),
            Some("yml") | Some("yaml") => Ok(RecipeFormat::Yaml),
            Some("toml") => Ok(RecipeFormat::Toml),
            other => Err(Error::validation_invalid_argument(
                "recipe",
                format!(
                    "Unsupported recipe extension '{}'",
                    other.unwrap_or_default()
                ),
                Some(path.display().to_string()),
                Some(vec![
                    "json".to_string(),
                    "yml".to_string(),
                    "yaml".to_string(),
                    "toml".to_string(),
                ]),
            )),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RecipeFile {
    #[serde(default)]
    pub settings: BTreeMap<String, SettingValue>,
    #[serde(default)]
    pub ask: BTreeMap<String, AskDefault>,
    #[serde(default)]
    pub roles: BTreeMap<String, Vec<HostSpec>>,
    #[serde(default)]
    pub stages: BTreeMap<String, StageFile>,
    #[serde(default)]
    pub tasks: Vec<TaskSpec>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StageFile {
    #[serde(default)]
    pub settings: BTreeMap<String, SettingValue>,
    #[serde(default)]
    pub roles: BTreeMap<String, Vec<HostSpec>>,
    #[serde(default)]
    pub tasks: Vec<TaskSpec>,
}

/// Default for an `ask`ed setting: a local command's stdout, a literal
/// value, or the command with the value as fallback.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AskDefault {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub value: Option<SettingValue>,
}

/// A host written either as `user@address:port` or as a full record.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum HostSpec {
    Short(String),
    Full(Host),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TaskSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub roles: Vec<String>,
    /// Directory every `run` step changes into first.
    #[serde(default)]
    pub within: Option<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// A step is a bare command string, a `run` record or an `invoke` record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Step {
    Command(String),
    Run(RunStep),
    Invoke(InvokeStep),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunStep {
    pub run: String,
    /// Overrides the task's `within` for this command.
    #[serde(default)]
    pub within: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InvokeStep {
    pub invoke: String,
}

/// Caller-side inputs applied on top of the recipe file.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub stage: Option<String>,
    /// `STAGEHAND_*` variables, already mapped to setting names.
    pub env: Vec<(String, String)>,
    /// `--set key=value` pairs; these win over the environment.
    pub overrides: Vec<(String, String)>,
}

pub struct Recipe {
    pub path: Option<PathBuf>,
    pub stage: Option<String>,
    pub settings: Settings,
    pub roles: RoleRegistry,
    pub tasks: TaskGraph,
}

impl std::fmt::Debug for Recipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recipe")
            .field("path", &self.path)
            .field("stage", &self.stage)
            .field("tasks", &self.tasks.names())
            .field("roles", &self.roles.names())
            .finish()
    }
}

/// Find the first default recipe file in `dir`.
pub fn find_recipe(dir: &Path) -> Result<PathBuf> {
    DEFAULT_RECIPE_FILES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
        .ok_or_else(|| {
            Error::config_missing_key("recipe", Some(dir.display().to_string())).with_hint(
                format!(
                    "Create one of {} or pass --recipe <path>",
                    DEFAULT_RECIPE_FILES.join(", ")
                ),
            )
        })
}

pub fn load(path: &Path, options: &LoadOptions) -> Result<Recipe> {
    let format = RecipeFormat::from_path(path)?;
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("read {}", path.display())))
    })?;

    let mut recipe = load_str(&content, format, &path.display().to_string(), options)?;
    recipe.path = Some(path.to_path_buf());
    log_status!("recipe", "Loaded {}", path.display());
    Ok(recipe)
}

/// Parse and assemble a recipe. `origin` names the source in errors.
pub fn load_str(
    content: &str,
    format: RecipeFormat,
    origin: &str,
    options: &LoadOptions,
) -> Result<Recipe> {
    let file = parse(content, format, origin)?;
    assemble(file, options)
}

pub fn parse(content: &str, format: RecipeFormat, origin: &str) -> Result<RecipeFile> {
    let parsed = match format {
        RecipeFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        RecipeFormat::Yaml => serde_yml::from_str(content).map_err(|e| e.to_string()),
        RecipeFormat::Toml => toml::from_str(content).map_err(|e| e.to_string()),
    };
    parsed.map_err(|e| Error::config_invalid_recipe(origin, format.as_str(), e))
}

fn assemble(mut file: RecipeFile, options: &LoadOptions) -> Result<Recipe> {
    let stage = match &options.stage {
        Some(name) => {
            let stage = file.stages.remove(name).ok_or_else(|| {
                Error::config_invalid_value(
                    "stage",
                    Some(name.clone()),
                    format!(
                        "Unknown stage; available: {}",
                        file.stages.keys().cloned().collect::<Vec<_>>().join(", ")
                    ),
                )
            })?;
            Some(stage)
        }
        None => None,
    };

    let mut settings = Settings::new();
    apply_caller_values(&mut settings, options);

    for (name, value) in &file.settings {
        settings.set(name.clone(), value.clone());
    }
    if let Some(stage) = &stage {
        for (name, value) in &stage.settings {
            settings.set(name.clone(), value.clone());
        }
    }
    // The caller always has the last word over recipe `set`s.
    apply_caller_values(&mut settings, options);

    for (name, default) in &file.ask {
        // Defaults may run local commands; skip them when a value exists.
        if settings.contains(name) {
            continue;
        }
        let value = compute_ask_default(name, default, &settings)?;
        settings.ask(name.clone(), || Ok(value))?;
    }

    let mut role_specs = file.roles;
    let mut task_specs = file.tasks;
    if let Some(stage) = stage {
        role_specs.extend(stage.roles);
        task_specs.extend(stage.tasks);
    }

    let roles = build_roles(role_specs, &settings)?;
    let tasks = build_tasks(&task_specs, &settings)?;

    Ok(Recipe {
        path: None,
        stage: options.stage.clone(),
        settings,
        roles,
        tasks,
    })
}

fn apply_caller_values(settings: &mut Settings, options: &LoadOptions) {
    for (name, value) in options.env.iter().chain(options.overrides.iter()) {
        settings.provide(name.clone(), value.clone());
    }
}

fn compute_ask_default(name: &str, default: &AskDefault, settings: &Settings) -> Result<SettingValue> {
    if let Some(command) = &default.command {
        let command = settings.render(command)?;
        let output = execute_local_command(&command);
        if output.success {
            return Ok(SettingValue::String(output.stdout.trim().to_string()));
        }
        if default.value.is_none() {
            return Err(Error::config_invalid_value(
                name,
                None,
                format!(
                    "Default command '{}' failed: {}",
                    command,
                    output.stderr.trim()
                ),
            ));
        }
        log_status!("recipe", "'{}' failed, using fallback for '{}'", command, name);
    }

    default.value.clone().ok_or_else(|| {
        Error::config_invalid_value(name, None, "ask needs a 'command' or a 'value'")
    })
}

fn build_roles(specs: BTreeMap<String, Vec<HostSpec>>, settings: &Settings) -> Result<RoleRegistry> {
    let mut roles = RoleRegistry::new();
    for (name, hosts) in specs {
        let hosts = hosts
            .into_iter()
            .map(|spec| match spec {
                HostSpec::Short(text) => parse_host(&text),
                HostSpec::Full(host) => Ok(host),
            })
            .collect::<Result<Vec<_>>>()?;
        roles.define(name, hosts);
    }

    for host in roles.hosts_mut() {
        if host.user.is_none() {
            host.user = Some(settings.fetch_string("user").map_err(|err| {
                Error::config_missing_key("user", Some(host.address.clone()))
                    .with_hint(err.message)
            })?);
        }
        if !host.is_valid() {
            return Err(Error::config_invalid_value(
                "roles",
                Some(host.key()),
                "hosts need a non-empty address and user",
            ));
        }
    }

    Ok(roles)
}

/// Parse `[user@]address[:port]`.
pub fn parse_host(text: &str) -> Result<Host> {
    let text = text.trim();
    let (user, rest) = match text.split_once('@') {
        Some((user, rest)) => (Some(user.to_string()), rest),
        None => (None, text),
    };

    // Bracketless IPv6 addresses contain several colons; treat them as address-only.
    let (address, port) = match rest.rsplit_once(':') {
        Some((address, port)) if !address.contains(':') => {
            let port = port.parse::<u16>().map_err(|_| {
                Error::config_invalid_value("roles", Some(text.to_string()), "invalid port")
            })?;
            (address.to_string(), port)
        }
        _ => (rest.to_string(), 22),
    };

    if address.is_empty() {
        return Err(Error::config_invalid_value(
            "roles",
            Some(text.to_string()),
            "host address is empty",
        ));
    }

    let mut host = Host::new(address).with_port(port);
    host.user = user;
    Ok(host)
}

fn build_tasks(specs: &[TaskSpec], settings: &Settings) -> Result<TaskGraph> {
    let mut graph = TaskGraph::new();

    for spec in specs {
        validate_task(spec, settings)?;
        graph.define_boxed(
            spec.name.clone(),
            spec.description.clone(),
            spec.roles.clone(),
            build_body(spec),
        );
    }

    // Nested invocations are resolved by name at run time; catch typos now.
    for spec in specs {
        for step in &spec.steps {
            if let Step::Invoke(InvokeStep { invoke }) = step {
                if !graph.contains(invoke) {
                    return Err(Error::task_not_found(invoke.clone(), graph.names())
                        .with_hint(format!("Referenced from task '{}'", spec.name)));
                }
            }
        }
    }

    Ok(graph)
}

fn validate_task(spec: &TaskSpec, settings: &Settings) -> Result<()> {
    if spec.name.trim().is_empty() {
        return Err(Error::config_invalid_value(
            "tasks",
            None,
            "task name must not be empty",
        ));
    }

    let has_commands = spec
        .steps
        .iter()
        .any(|step| !matches!(step, Step::Invoke(_)));
    if has_commands && spec.roles.is_empty() {
        return Err(Error::config_invalid_value(
            "tasks",
            Some(spec.name.clone()),
            "task runs commands but declares no roles",
        ));
    }

    // Every setting a body will interpolate must resolve before it runs.
    let mut templates: Vec<&str> = spec.within.iter().map(String::as_str).collect();
    for step in &spec.steps {
        match step {
            Step::Command(run) => templates.push(run),
            Step::Run(RunStep { run, within }) => {
                templates.push(run);
                templates.extend(within.as_deref());
            }
            Step::Invoke(_) => {}
        }
    }
    for text in templates {
        if !template::placeholders(text).is_empty() {
            settings.render(text).map_err(|err| {
                err.with_hint(format!("Needed by task '{}'", spec.name))
            })?;
        }
    }

    Ok(())
}

fn build_body(spec: &TaskSpec) -> TaskBody {
    let steps = spec.steps.clone();
    let task_within = spec.within.clone();

    Rc::new(move |ctx: &mut TaskContext<'_, '_>| -> Result<()> {
        for step in &steps {
            match step {
                Step::Command(run) => {
                    run_step(ctx, run, task_within.as_deref())?;
                }
                Step::Run(RunStep { run, within }) => {
                    run_step(ctx, run, within.as_deref().or(task_within.as_deref()))?;
                }
                Step::Invoke(InvokeStep { invoke }) => ctx.invoke(invoke)?,
            }
        }
        Ok(())
    })
}

fn run_step(ctx: &mut TaskContext<'_, '_>, command: &str, within: Option<&str>) -> Result<()> {
    match within {
        Some(dir) => ctx.within(dir, command)?,
        None => ctx.execute(command)?,
    };
    Ok(())
}

fn set_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)=(.*)$").expect("set pattern is valid")
    })
}

/// Parse a `--set key=value` argument.
pub fn parse_override(arg: &str) -> Result<(String, String)> {
    let caps = set_pattern().captures(arg).ok_or_else(|| {
        Error::validation_invalid_argument(
            "set",
            "Expected key=value",
            Some(arg.to_string()),
            None,
        )
    })?;
    Ok((caps[1].to_string(), caps[2].to_string()))
}

/// Map `STAGEHAND_DEPLOY_TO=/srv/app` to `("deploy_to", "/srv/app")`.
pub fn env_overrides<I>(vars: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut pairs: Vec<(String, String)> = vars
        .into_iter()
        .filter_map(|(key, value)| {
            let name = key.strip_prefix(ENV_PREFIX)?;
            if name.is_empty() || RESERVED_ENV.contains(&name) {
                return None;
            }
            Some((name.to_snake_case(), value))
        })
        .collect();
    pairs.sort();
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::settings::Provenance;

    const MINIMAL: &str = r#"{
        "settings": { "application": "demo", "user": "deploy" },
        "roles": { "app": ["app1.example.com", "ops@app2.example.com:2222"] },
        "tasks": [
            { "name": "ps", "roles": ["app"], "within": "{{release_path}}", "steps": ["docker ps"] }
        ]
    }"#;

    fn load_json(content: &str, options: &LoadOptions) -> Result<Recipe> {
        load_str(content, RecipeFormat::Json, "test.json", options)
    }

    #[test]
    fn hosts_inherit_user_setting() {
        let recipe = load_json(MINIMAL, &LoadOptions::default()).unwrap();
        let hosts = recipe.roles.role("app").unwrap();

        assert_eq!(hosts[0].user.as_deref(), Some("deploy"));
        assert_eq!(hosts[1].user.as_deref(), Some("ops"));
        assert_eq!(hosts[1].port, 2222);
    }

    #[test]
    fn caller_values_beat_recipe_settings() {
        let options = LoadOptions {
            env: vec![("application".to_string(), "from-env".to_string())],
            overrides: vec![("user".to_string(), "root".to_string())],
            ..Default::default()
        };
        let recipe = load_json(MINIMAL, &options).unwrap();

        assert_eq!(recipe.settings.fetch_string("application").unwrap(), "from-env");
        assert_eq!(recipe.settings.provenance("user"), Some(Provenance::Provided));
    }

    #[test]
    fn override_wins_over_env() {
        let options = LoadOptions {
            env: vec![("branch".to_string(), "env".to_string())],
            overrides: vec![("branch".to_string(), "cli".to_string())],
            ..Default::default()
        };
        let recipe = load_json(MINIMAL, &options).unwrap();

        assert_eq!(recipe.settings.fetch_string("branch").unwrap(), "cli");
    }

    #[test]
    fn ask_value_fallback_and_noop() {
        let content = r#"{
            "ask": { "branch": { "command": "exit 1", "value": "main" } }
        }"#;
        let recipe = load_json(content, &LoadOptions::default()).unwrap();
        assert_eq!(recipe.settings.fetch_string("branch").unwrap(), "main");
        assert_eq!(recipe.settings.provenance("branch"), Some(Provenance::Computed));

        let options = LoadOptions {
            overrides: vec![("branch".to_string(), "hotfix".to_string())],
            ..Default::default()
        };
        let recipe = load_json(content, &options).unwrap();
        assert_eq!(recipe.settings.fetch_string("branch").unwrap(), "hotfix");
    }

    #[cfg(unix)]
    #[test]
    fn ask_command_output_is_trimmed() {
        let content = r#"{ "ask": { "revision": { "command": "echo '  abc123  '" } } }"#;
        let recipe = load_json(content, &LoadOptions::default()).unwrap();

        assert_eq!(recipe.settings.fetch_string("revision").unwrap(), "abc123");
    }

    #[test]
    fn stage_merges_over_base() {
        let content = r#"{
            "settings": { "application": "demo", "user": "deploy" },
            "roles": { "app": ["dev.example.com"] },
            "stages": {
                "prod": {
                    "settings": { "deploy_to": "/srv/{{application}}" },
                    "roles": { "app": ["prod1.example.com", "prod2.example.com"] }
                }
            }
        }"#;
        let options = LoadOptions {
            stage: Some("prod".to_string()),
            ..Default::default()
        };
        let recipe = load_json(content, &options).unwrap();

        assert_eq!(recipe.roles.role("app").unwrap().len(), 2);
        assert_eq!(recipe.settings.fetch_string("deploy_to").unwrap(), "/srv/demo");
    }

    #[test]
    fn unknown_stage_is_rejected() {
        let options = LoadOptions {
            stage: Some("qa".to_string()),
            ..Default::default()
        };
        let err = load_json(MINIMAL, &options).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigInvalidValue);
    }

    #[test]
    fn missing_setting_fails_at_load() {
        let content = r#"{
            "settings": { "user": "deploy" },
            "roles": { "app": ["a"] },
            "tasks": [ { "name": "ps", "roles": ["app"], "steps": ["cd {{release_path}}"] } ]
        }"#;
        let err = load_json(content, &LoadOptions::default()).unwrap_err();

        // release_path -> deploy_to -> application
        assert_eq!(err.code, ErrorCode::ConfigMissingKey);
        assert_eq!(err.details["key"], "application");
    }

    #[test]
    fn invoke_of_undefined_task_fails_at_load() {
        let content = r#"{
            "tasks": [ { "name": "restart", "steps": [ { "invoke": "stop" } ] } ]
        }"#;
        let err = load_json(content, &LoadOptions::default()).unwrap_err();
        assert_eq!(err.code, ErrorCode::TaskNotFound);
    }

    #[test]
    fn commands_without_roles_are_rejected() {
        let content = r#"{ "tasks": [ { "name": "ps", "steps": ["docker ps"] } ] }"#;
        let err = load_json(content, &LoadOptions::default()).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigInvalidValue);
    }

    #[test]
    fn host_without_user_anywhere_fails() {
        let content = r#"{ "roles": { "app": ["a.example.com"] } }"#;
        let err = load_json(content, &LoadOptions::default()).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigMissingKey);
        assert_eq!(err.details["key"], "user");
    }

    #[test]
    fn unknown_fields_are_invalid() {
        let err = load_json(r#"{ "setings": {} }"#, &LoadOptions::default()).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigInvalidRecipe);
    }

    #[test]
    fn misspelled_step_keys_are_invalid() {
        let content = r#"{
            "settings": { "user": "deploy" },
            "roles": { "app": ["a"] },
            "tasks": [ { "name": "up", "roles": ["app"],
                "steps": [ { "run": "docker compose up -d", "witihn": "/srv/app" } ] } ]
        }"#;
        let err = load_json(content, &LoadOptions::default()).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigInvalidRecipe);

        let content = r#"{
            "tasks": [
                { "name": "stop", "steps": [] },
                { "name": "restart", "steps": [ { "invoke": "stop", "within": "/srv/app" } ] }
            ]
        }"#;
        let err = load_json(content, &LoadOptions::default()).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigInvalidRecipe);
    }

    #[test]
    fn host_records_use_camel_case_keys() {
        let content = r#"{
            "settings": { "user": "deploy" },
            "roles": { "app": [ { "address": "a.example.com", "identity_file": "~/.ssh/deploy_key" } ] }
        }"#;
        let err = load_json(content, &LoadOptions::default()).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigInvalidRecipe);

        let content = r#"{
            "settings": { "user": "deploy" },
            "roles": { "app": [ { "address": "a.example.com", "identityFile": "~/.ssh/deploy_key" } ] }
        }"#;
        let recipe = load_json(content, &LoadOptions::default()).unwrap();
        let host = &recipe.roles.role("app").unwrap()[0];
        assert_eq!(host.identity_file.as_deref(), Some("~/.ssh/deploy_key"));
    }

    #[test]
    fn step_within_overrides_task_within() {
        let content = r#"{
            "settings": { "user": "deploy" },
            "roles": { "app": ["a"] },
            "tasks": [ { "name": "up", "roles": ["app"], "within": "/srv/task",
                "steps": [ { "run": "docker compose up -d", "within": "/srv/step" }, "docker ps" ] } ]
        }"#;
        let recipe = load_json(content, &LoadOptions::default()).unwrap();
        let mut executor = crate::Executor::dry_run();

        let report = crate::Runner::new(&recipe.tasks, &recipe.settings, &recipe.roles, &mut executor)
            .run("up")
            .unwrap();

        let commands: Vec<&str> = report.results.iter().map(|r| r.command.as_str()).collect();
        assert_eq!(
            commands,
            vec![
                "cd '/srv/step' && docker compose up -d",
                "cd '/srv/task' && docker ps"
            ]
        );
    }

    #[test]
    fn parse_errors_name_the_format() {
        let err = parse("tasks: [", RecipeFormat::Yaml, "r.yml").unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigInvalidRecipe);
        assert_eq!(err.details["format"], "yaml");
        assert_eq!(err.details["path"], "r.yml");
    }

    #[test]
    fn yaml_and_toml_recipes() {
        let yaml = "settings:\n  user: deploy\n  keep_releases: 3\nroles:\n  app:\n    - a.example.com\n";
        let recipe = load_str(yaml, RecipeFormat::Yaml, "r.yml", &LoadOptions::default()).unwrap();
        assert_eq!(recipe.settings.fetch_integer("keep_releases").unwrap(), 3);

        let toml = "[settings]\nuser = \"deploy\"\nlinked_dirs = [\"config\"]\n\n[roles]\napp = [\"a.example.com\"]\n";
        let recipe = load_str(toml, RecipeFormat::Toml, "r.toml", &LoadOptions::default()).unwrap();
        assert_eq!(recipe.settings.fetch_list("linked_dirs").unwrap(), vec!["config"]);
        assert_eq!(recipe.roles.role("app").unwrap().len(), 1);
    }

    #[test]
    fn parse_host_forms() {
        let host = parse_host("libsys@app1.example.com:2200").unwrap();
        assert_eq!(host.user.as_deref(), Some("libsys"));
        assert_eq!(host.address, "app1.example.com");
        assert_eq!(host.port, 2200);

        let host = parse_host("::1").unwrap();
        assert_eq!(host.address, "::1");
        assert_eq!(host.port, 22);

        assert!(parse_host("app1:http").is_err());
    }

    #[test]
    fn parse_override_forms() {
        assert_eq!(
            parse_override("branch=feature/x=y").unwrap(),
            ("branch".to_string(), "feature/x=y".to_string())
        );
        assert!(parse_override("no-equals").is_err());
        assert!(parse_override("1bad=x").is_err());
    }

    #[test]
    fn env_overrides_map_to_snake_case() {
        let vars = vec![
            ("STAGEHAND_DEPLOY_TO".to_string(), "/srv/app".to_string()),
            ("STAGEHAND_".to_string(), "ignored".to_string()),
            ("STAGEHAND_STAGE".to_string(), "prod".to_string()),
            ("HOME".to_string(), "/root".to_string()),
        ];
        assert_eq!(
            env_overrides(vars),
            vec![("deploy_to".to_string(), "/srv/app".to_string())]
        );
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(
            RecipeFormat::from_path(Path::new("stagehand.yaml")).unwrap(),
            RecipeFormat::Yaml
        );
        assert!(RecipeFormat::from_path(Path::new("stagehand.rb")).is_err());
    }
}
