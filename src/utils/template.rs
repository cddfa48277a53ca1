//! String template rendering utilities.
//!
//! Placeholders use the `{{name}}` form; whitespace inside the braces is
//! tolerated (`{{ release_path }}`).

use regex::Regex;
use std::sync::OnceLock;

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder pattern is valid")
    })
}

/// Names referenced by `{{...}}` placeholders, in first-seen order.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in placeholder_pattern().captures_iter(template) {
        let name = &caps[1];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

pub fn render(template: &str, variables: &[(&str, &str)]) -> String {
    placeholder_pattern()
        .replace_all(template, |caps: &regex::Captures| {
            let name = &caps[1];
            variables
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_in_order_without_duplicates() {
        let names = placeholders("cd {{release_path}} && cp {{ release_path }}/{{file}} .");
        assert_eq!(names, vec!["release_path", "file"]);
    }

    #[test]
    fn render_replaces_known_and_keeps_unknown() {
        let out = render("{{a}}-{{ b }}-{{c}}", &[("a", "1"), ("b", "2")]);
        assert_eq!(out, "1-2-{{c}}");
    }

    #[test]
    fn shell_braces_are_not_placeholders() {
        assert!(placeholders("echo ${HOME} {not} {{ }}").is_empty());
        assert_eq!(placeholders("docker ps {{flags}}"), vec!["flags"]);
    }
}
