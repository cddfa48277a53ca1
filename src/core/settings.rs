//! Deployment settings store.
//!
//! Settings are loaded once at startup (documented defaults, caller values,
//! recipe `set`s and `ask`s) and handed to the runner by shared reference,
//! so nothing can change them once tasks start executing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::utils::template;

/// Guards against settings whose templates refer back to themselves.
const MAX_RENDER_DEPTH: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Integer(i64),
    List(Vec<String>),
    String(String),
}

impl SettingValue {
    /// Value as it appears when interpolated into a command.
    pub fn to_template_string(&self) -> String {
        match self {
            SettingValue::Integer(n) => n.to_string(),
            SettingValue::List(items) => items.join(" "),
            SettingValue::String(s) => s.clone(),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            SettingValue::Integer(_) => "integer",
            SettingValue::List(_) => "list",
            SettingValue::String(_) => "string",
        }
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        SettingValue::String(value.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(value: String) -> Self {
        SettingValue::String(value)
    }
}

impl From<i64> for SettingValue {
    fn from(value: i64) -> Self {
        SettingValue::Integer(value)
    }
}

impl From<Vec<String>> for SettingValue {
    fn from(value: Vec<String>) -> Self {
        SettingValue::List(value)
    }
}

/// Where a setting's current value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Provenance {
    /// Passed by the caller (`--set`, environment).
    Provided,
    /// Assigned by the recipe with `set`.
    Explicit,
    /// Filled in by `ask` from its computed default.
    Computed,
    /// Built-in documented default.
    Default,
    /// Derived from other settings (deploy paths).
    Derived,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setting {
    pub value: SettingValue,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingEntry {
    pub name: String,
    pub value: SettingValue,
    pub provenance: Provenance,
}

pub struct Defaults;

impl Defaults {
    pub const BRANCH: &'static str = "branch";
    pub const LOG_LEVEL: &'static str = "log_level";
    pub const KEEP_RELEASES: &'static str = "keep_releases";
    pub const LINKED_DIRS: &'static str = "linked_dirs";
    pub const DEPLOY_TO: &'static str = "deploy_to";
    pub const CURRENT_PATH: &'static str = "current_path";
    pub const RELEASES_PATH: &'static str = "releases_path";
    pub const SHARED_PATH: &'static str = "shared_path";
    pub const RELEASE_PATH: &'static str = "release_path";

    fn documented(name: &str) -> Option<SettingValue> {
        match name {
            Self::BRANCH => Some("master".into()),
            Self::LOG_LEVEL => Some("debug".into()),
            Self::KEEP_RELEASES => Some(SettingValue::Integer(5)),
            Self::LINKED_DIRS => Some(SettingValue::List(Vec::new())),
            Self::DEPLOY_TO => Some("/var/www/{{application}}".into()),
            _ => None,
        }
    }

    fn documented_names() -> &'static [&'static str] {
        &[
            Self::BRANCH,
            Self::LOG_LEVEL,
            Self::KEEP_RELEASES,
            Self::LINKED_DIRS,
            Self::DEPLOY_TO,
        ]
    }

    /// Template for a path derived from `deploy_to`.
    fn derived(name: &str) -> Option<&'static str> {
        match name {
            Self::CURRENT_PATH => Some("{{deploy_to}}/current"),
            Self::RELEASES_PATH => Some("{{deploy_to}}/releases"),
            Self::SHARED_PATH => Some("{{deploy_to}}/shared"),
            Self::RELEASE_PATH => Some("{{current_path}}"),
            _ => None,
        }
    }

    fn derived_names() -> &'static [&'static str] {
        &[
            Self::CURRENT_PATH,
            Self::RELEASES_PATH,
            Self::SHARED_PATH,
            Self::RELEASE_PATH,
        ]
    }
}

#[derive(Debug, Clone, Default)]
pub struct Settings {
    values: BTreeMap<String, Setting>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store or overwrite a setting.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<SettingValue>) {
        self.insert(name.into(), value.into(), Provenance::Explicit);
    }

    /// Store a caller-supplied value.
    pub fn provide(&mut self, name: impl Into<String>, value: impl Into<SettingValue>) {
        self.insert(name.into(), value.into(), Provenance::Provided);
    }

    /// Assign `computed` only when nothing has set `name` yet.
    ///
    /// The default is evaluated lazily, so an expensive computation (a
    /// local command) only runs when its result is needed.
    pub fn ask<F>(&mut self, name: impl Into<String>, computed: F) -> Result<()>
    where
        F: FnOnce() -> Result<SettingValue>,
    {
        let name = name.into();
        if self.values.contains_key(&name) {
            return Ok(());
        }

        let value = computed()?;
        self.insert(name, value, Provenance::Computed);
        Ok(())
    }

    fn insert(&mut self, name: String, value: SettingValue, provenance: Provenance) {
        self.values.insert(name, Setting { value, provenance });
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Current value, falling back to the documented default.
    pub fn fetch(&self, name: &str) -> Result<SettingValue> {
        self.resolve(name, 0)
    }

    /// Current value, falling back to `default` (ahead of any documented default).
    pub fn fetch_or(&self, name: &str, default: impl Into<SettingValue>) -> Result<SettingValue> {
        if self.values.contains_key(name) {
            self.resolve(name, 0)
        } else {
            Ok(default.into())
        }
    }

    pub fn fetch_string(&self, name: &str) -> Result<String> {
        match self.fetch(name)? {
            SettingValue::String(s) => Ok(s),
            other => Err(type_mismatch(name, &other, "string")),
        }
    }

    pub fn fetch_integer(&self, name: &str) -> Result<i64> {
        match self.fetch(name)? {
            SettingValue::Integer(n) => Ok(n),
            // Caller-supplied values arrive as strings.
            SettingValue::String(s) => s.trim().parse::<i64>().map_err(|_| {
                Error::config_invalid_value(name, Some(s.clone()), "expected an integer")
            }),
            other => Err(type_mismatch(name, &other, "integer")),
        }
    }

    pub fn fetch_list(&self, name: &str) -> Result<Vec<String>> {
        match self.fetch(name)? {
            SettingValue::List(items) => Ok(items),
            SettingValue::String(s) => Ok(s.split_whitespace().map(str::to_string).collect()),
            other => Err(type_mismatch(name, &other, "list")),
        }
    }

    pub fn provenance(&self, name: &str) -> Option<Provenance> {
        if let Some(setting) = self.values.get(name) {
            return Some(setting.provenance);
        }
        if Defaults::documented(name).is_some() {
            return Some(Provenance::Default);
        }
        Defaults::derived(name).map(|_| Provenance::Derived)
    }

    /// Every resolvable setting with its provenance, sorted by name.
    ///
    /// Defaults and derived paths that cannot be resolved (for example
    /// `deploy_to` without an `application`) are left out.
    pub fn entries(&self) -> Vec<SettingEntry> {
        let mut names: Vec<&str> = self.values.keys().map(String::as_str).collect();
        names.extend(Defaults::documented_names());
        names.extend(Defaults::derived_names());
        names.sort_unstable();
        names.dedup();

        names
            .into_iter()
            .filter_map(|name| {
                let value = self.fetch(name).ok()?;
                let provenance = self.provenance(name)?;
                Some(SettingEntry {
                    name: name.to_string(),
                    value,
                    provenance,
                })
            })
            .collect()
    }

    /// Expand `{{name}}` placeholders from the store.
    pub fn render(&self, text: &str) -> Result<String> {
        self.render_at(text, 0)
    }

    fn render_at(&self, text: &str, depth: usize) -> Result<String> {
        let names = template::placeholders(text);
        if names.is_empty() {
            return Ok(text.to_string());
        }

        let mut vars = Vec::with_capacity(names.len());
        for name in names {
            let value = self.resolve(&name, depth + 1)?;
            vars.push((name, value.to_template_string()));
        }

        let pairs: Vec<(&str, &str)> = vars
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        Ok(template::render(text, &pairs))
    }

    fn resolve(&self, name: &str, depth: usize) -> Result<SettingValue> {
        if depth > MAX_RENDER_DEPTH {
            return Err(Error::config_invalid_value(
                name,
                None,
                "setting refers to itself through {{...}} placeholders",
            ));
        }

        let raw = if let Some(setting) = self.values.get(name) {
            setting.value.clone()
        } else if let Some(default) = Defaults::documented(name) {
            default
        } else if let Some(derived) = Defaults::derived(name) {
            SettingValue::String(derived.to_string())
        } else {
            return Err(Error::config_missing_key(name, None));
        };

        match raw {
            SettingValue::String(s) => Ok(SettingValue::String(self.render_at(&s, depth)?)),
            SettingValue::List(items) => items
                .iter()
                .map(|item| self.render_at(item, depth))
                .collect::<Result<Vec<_>>>()
                .map(SettingValue::List),
            integer => Ok(integer),
        }
    }
}

fn type_mismatch(name: &str, value: &SettingValue, expected: &str) -> Error {
    Error::config_invalid_value(
        name,
        Some(value.to_template_string()),
        format!("expected a {}, found a {}", expected, value.type_name()),
    )
}
