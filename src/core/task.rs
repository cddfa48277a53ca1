//! Task graph and the sequential, fail-fast task runner.
//!
//! Tasks are registered by fully-qualified name (`airflow:restart`). A task
//! with roles runs its body once per host of those roles, in order; a task
//! without roles runs its body once with no host and is typically used to
//! compose other tasks.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::error::{Error, ErrorCode, Result};
use crate::executor::{ExecutionResult, Executor};
use crate::roles::{Host, RoleRegistry};
use crate::settings::{Defaults, SettingValue, Settings};
use crate::shell;

pub type TaskBody = Rc<dyn Fn(&mut TaskContext<'_, '_>) -> Result<()>>;

pub const NAMESPACE_SEPARATOR: char = ':';

#[derive(Clone)]
pub struct Task {
    pub name: String,
    pub description: String,
    pub roles: Vec<String>,
    body: TaskBody,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("roles", &self.roles)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub name: String,
    pub description: String,
    pub roles: Vec<String>,
}

impl From<&Task> for TaskSummary {
    fn from(task: &Task) -> Self {
        Self {
            name: task.name.clone(),
            description: task.description.clone(),
            roles: task.roles.clone(),
        }
    }
}

#[derive(Clone, Default)]
pub struct TaskGraph {
    tasks: BTreeMap<String, Task>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task. An existing task with the same name is replaced.
    pub fn define<F>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        roles: &[&str],
        body: F,
    ) where
        F: Fn(&mut TaskContext<'_, '_>) -> Result<()> + 'static,
    {
        self.define_boxed(
            name.into(),
            description.into(),
            roles.iter().map(|r| r.to_string()).collect(),
            Rc::new(body),
        );
    }

    pub(crate) fn define_boxed(
        &mut self,
        name: String,
        description: String,
        roles: Vec<String>,
        body: TaskBody,
    ) {
        if self.tasks.contains_key(&name) {
            log_status!("task", "Redefining task '{}'", name);
        }
        self.tasks.insert(
            name.clone(),
            Task {
                name,
                description,
                roles,
                body,
            },
        );
    }

    /// Define tasks under `prefix:`.
    pub fn namespace(&mut self, prefix: &str) -> Namespace<'_> {
        Namespace {
            graph: self,
            prefix: prefix.to_string(),
        }
    }

    pub fn task(&self, name: &str) -> Result<&Task> {
        self.tasks
            .get(name)
            .ok_or_else(|| Error::task_not_found(name, self.names()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.tasks.keys().cloned().collect()
    }

    /// Tasks sorted by name.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn summaries(&self) -> Vec<TaskSummary> {
        self.tasks().map(TaskSummary::from).collect()
    }
}

pub struct Namespace<'g> {
    graph: &'g mut TaskGraph,
    prefix: String,
}

impl Namespace<'_> {
    pub fn define<F>(
        &mut self,
        name: &str,
        description: impl Into<String>,
        roles: &[&str],
        body: F,
    ) -> &mut Self
    where
        F: Fn(&mut TaskContext<'_, '_>) -> Result<()> + 'static,
    {
        let full = format!("{}{}{}", self.prefix, NAMESPACE_SEPARATOR, name);
        self.graph.define(full, description, roles, body);
        self
    }

    pub fn namespace(&mut self, prefix: &str) -> Namespace<'_> {
        Namespace {
            prefix: format!("{}{}{}", self.prefix, NAMESPACE_SEPARATOR, prefix),
            graph: &mut *self.graph,
        }
    }
}

/// Lifecycle of one task invocation, reported through `log_status!`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Resolving,
    Executing { host_index: usize, host_count: usize },
    Succeeded,
    Failed,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Pending => write!(f, "pending"),
            TaskState::Resolving => write!(f, "resolving"),
            TaskState::Executing {
                host_index,
                host_count,
            } => write!(f, "executing ({}/{})", host_index + 1, host_count),
            TaskState::Succeeded => write!(f, "succeeded"),
            TaskState::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: String,
    pub task: String,
    pub succeeded: bool,
    /// Every task entered, in invocation order (nested ones included).
    pub invoked: Vec<String>,
    pub results: Vec<ExecutionResult>,
}

pub struct Runner<'a> {
    graph: &'a TaskGraph,
    settings: &'a Settings,
    roles: &'a RoleRegistry,
    executor: &'a mut Executor,
    stack: Vec<String>,
    invoked: Vec<String>,
}

impl<'a> Runner<'a> {
    pub fn new(
        graph: &'a TaskGraph,
        settings: &'a Settings,
        roles: &'a RoleRegistry,
        executor: &'a mut Executor,
    ) -> Self {
        Self {
            graph,
            settings,
            roles,
            executor,
            stack: Vec::new(),
            invoked: Vec::new(),
        }
    }

    /// Invoke `name` as the top-level task and collect everything it ran.
    pub fn run(mut self, name: &str) -> Result<RunReport> {
        self.invoke(name)?;

        Ok(RunReport {
            run_id: uuid::Uuid::new_v4().to_string(),
            task: name.to_string(),
            succeeded: true,
            invoked: std::mem::take(&mut self.invoked),
            results: self.executor.take_results(),
        })
    }

    /// Invoke a task by name. The first failure stops the invocation and
    /// is returned as `task.failed`; nothing after it runs.
    pub fn invoke(&mut self, name: &str) -> Result<()> {
        let graph = self.graph;
        let task = graph.task(name)?;
        self.transition(name, TaskState::Pending);

        if self.stack.iter().any(|entry| entry == name) {
            let mut chain = self.stack.clone();
            chain.push(name.to_string());
            return Err(Error::task_cycle(chain));
        }

        self.transition(name, TaskState::Resolving);
        let hosts = if task.roles.is_empty() {
            None
        } else {
            match self.roles.resolve(&task.roles) {
                Ok(hosts) => Some(hosts),
                Err(err) => {
                    self.transition(name, TaskState::Failed);
                    return Err(wrap_failure(name, None, err));
                }
            }
        };

        self.stack.push(name.to_string());
        self.invoked.push(name.to_string());
        let outcome = self.execute_body(task, hosts.as_deref());
        self.stack.pop();

        match &outcome {
            Ok(()) => self.transition(name, TaskState::Succeeded),
            Err(_) => self.transition(name, TaskState::Failed),
        }
        outcome
    }

    fn execute_body(&mut self, task: &'a Task, hosts: Option<&[Host]>) -> Result<()> {
        let Some(hosts) = hosts else {
            let mut ctx = TaskContext {
                runner: self,
                task: &task.name,
                host: None,
            };
            return (task.body)(&mut ctx).map_err(|err| wrap_failure(&task.name, None, err));
        };

        if hosts.is_empty() {
            log_status!("task", "{}: no hosts in roles {:?}, nothing to do", task.name, task.roles);
        }

        let host_count = hosts.len();
        for (host_index, host) in hosts.iter().enumerate() {
            self.transition(
                &task.name,
                TaskState::Executing {
                    host_index,
                    host_count,
                },
            );

            let mut ctx = TaskContext {
                runner: self,
                task: &task.name,
                host: Some(host),
            };
            (task.body)(&mut ctx)
                .map_err(|err| wrap_failure(&task.name, Some(host.address.clone()), err))?;
        }

        Ok(())
    }

    fn transition(&self, name: &str, state: TaskState) {
        log_status!("task", "{}: {}", name, state);
    }
}

/// Failures from nested invocations already name their task and host.
fn wrap_failure(task: &str, host: Option<String>, err: Error) -> Error {
    if err.code == ErrorCode::TaskFailed {
        err
    } else {
        Error::task_failed(task, host, err)
    }
}

/// What a task body sees: the target host, settings, and the executor.
pub struct TaskContext<'r, 'a> {
    runner: &'r mut Runner<'a>,
    task: &'r str,
    host: Option<&'r Host>,
}

impl TaskContext<'_, '_> {
    pub fn task_name(&self) -> &str {
        self.task
    }

    pub fn host(&self) -> Option<&Host> {
        self.host
    }

    pub fn settings(&self) -> &Settings {
        self.runner.settings
    }

    pub fn fetch(&self, name: &str) -> Result<SettingValue> {
        self.runner.settings.fetch(name)
    }

    pub fn fetch_string(&self, name: &str) -> Result<String> {
        self.runner.settings.fetch_string(name)
    }

    pub fn release_path(&self) -> Result<String> {
        self.runner.settings.fetch_string(Defaults::RELEASE_PATH)
    }

    fn require_host(&self) -> Result<&Host> {
        self.host.ok_or_else(|| {
            Error::validation_invalid_argument(
                "roles",
                format!(
                    "Task '{}' declares no roles, so it cannot run remote commands",
                    self.task
                ),
                Some(self.task.to_string()),
                None,
            )
        })
    }

    /// Run a command on the current host. `{{setting}}` placeholders are expanded.
    pub fn execute(&mut self, command: &str) -> Result<ExecutionResult> {
        let host = self.require_host()?.clone();
        let command = self.runner.settings.render(command)?;
        self.runner.executor.execute(&host, &command)
    }

    /// Run a command from inside `dir`.
    pub fn within(&mut self, dir: &str, command: &str) -> Result<ExecutionResult> {
        let dir = self.runner.settings.render(dir)?;
        self.execute(&shell::in_dir(&dir, command))
    }

    /// Run a command and report whether it exited zero. A non-zero exit is not a failure.
    pub fn test(&mut self, command: &str) -> Result<bool> {
        let host = self.require_host()?.clone();
        let command = self.runner.settings.render(command)?;
        Ok(self.runner.executor.run(&host, &command)?.success())
    }

    /// Run a command and return its trimmed stdout.
    pub fn capture(&mut self, command: &str) -> Result<String> {
        Ok(self.execute(command)?.stdout.trim().to_string())
    }

    /// Invoke another task; its failure becomes this task's failure.
    pub fn invoke(&mut self, name: &str) -> Result<()> {
        self.runner.invoke(name)
    }
}
