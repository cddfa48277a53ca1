use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Host {
    pub address: String,
    /// Filled from the `user` setting when the recipe omits it.
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub identity_file: Option<String>,
    /// Extra `ssh -o key=value` options.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
}

fn default_port() -> u16 {
    22
}

impl Host {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            user: None,
            port: default_port(),
            identity_file: None,
            options: BTreeMap::new(),
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// `user@address:port`, unique per connection target.
    pub fn key(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}:{}", user, self.address, self.port),
            None => format!("{}:{}", self.address, self.port),
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.address.is_empty() && self.user.as_ref().is_some_and(|u| !u.is_empty())
    }
}

#[derive(Debug, Clone, Default)]
pub struct RoleRegistry {
    roles: BTreeMap<String, Vec<Host>>,
}

impl RoleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a role. Repeated hosts keep their first position.
    pub fn define(&mut self, name: impl Into<String>, hosts: Vec<Host>) {
        let mut unique: Vec<Host> = Vec::with_capacity(hosts.len());
        for host in hosts {
            if !unique.iter().any(|h| h.key() == host.key()) {
                unique.push(host);
            }
        }
        self.roles.insert(name.into(), unique);
    }

    pub fn role(&self, name: &str) -> Result<&[Host]> {
        self.roles
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::role_not_found(name, self.names()))
    }

    /// Hosts of every named role, in declaration order, each host once.
    pub fn resolve(&self, names: &[String]) -> Result<Vec<Host>> {
        let mut hosts: Vec<Host> = Vec::new();
        for name in names {
            for host in self.role(name)? {
                if !hosts.iter().any(|h| h.key() == host.key()) {
                    hosts.push(host.clone());
                }
            }
        }
        Ok(hosts)
    }

    pub fn names(&self) -> Vec<String> {
        self.roles.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<Host>)> {
        self.roles.iter()
    }

    pub(crate) fn hosts_mut(&mut self) -> impl Iterator<Item = &mut Host> {
        self.roles.values_mut().flat_map(|hosts| hosts.iter_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn host(address: &str) -> Host {
        Host::new(address).with_user("libsys")
    }

    #[test]
    fn role_lookup_preserves_order() {
        let mut roles = RoleRegistry::new();
        roles.define("app", vec![host("b.example"), host("a.example")]);

        let hosts = roles.role("app").unwrap();
        assert_eq!(hosts[0].address, "b.example");
        assert_eq!(hosts[1].address, "a.example");
    }

    #[test]
    fn duplicate_hosts_are_dropped() {
        let mut roles = RoleRegistry::new();
        roles.define("app", vec![host("a"), host("b"), host("a")]);

        assert_eq!(roles.role("app").unwrap().len(), 2);
    }

    #[test]
    fn unknown_role_lists_available() {
        let mut roles = RoleRegistry::new();
        roles.define("app", vec![host("a")]);

        let err = roles.role("db").unwrap_err();
        assert_eq!(err.code, ErrorCode::RoleNotFound);
        assert_eq!(err.details["available"][0], "app");
    }

    #[test]
    fn resolve_unions_roles_without_repeats() {
        let mut roles = RoleRegistry::new();
        roles.define("app", vec![host("a"), host("b")]);
        roles.define("web", vec![host("b"), host("c")]);

        let hosts = roles
            .resolve(&["app".to_string(), "web".to_string()])
            .unwrap();
        let addresses: Vec<&str> = hosts.iter().map(|h| h.address.as_str()).collect();
        assert_eq!(addresses, vec!["a", "b", "c"]);
    }

    #[test]
    fn same_address_different_port_is_distinct() {
        let mut roles = RoleRegistry::new();
        roles.define("app", vec![host("a"), host("a").with_port(2222)]);

        assert_eq!(roles.role("app").unwrap().len(), 2);
    }
}
