//! Command templates
//!
//! A template is a full command line with `{name}` placeholders. Rendering
//! substitutes every placeholder or fails; the rendered line is what the
//! safety validator sees and what the transport runs.

use crate::error::RenderError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;

/// Characters that would let a value escape its position on a shell line
const FORBIDDEN: &[char] = &['\'', '"', '`', ';', '|', '&', '$', '\n', '\r', '<', '>'];

/// A value must stay one argument: no separators, no whitespace, and it
/// must not read as an option
fn is_unsafe_value(value: &str) -> bool {
    value.contains(FORBIDDEN) || value.contains(char::is_whitespace) || value.starts_with('-')
}

/// Placeholder values for one rendering
pub type Vars = BTreeMap<String, String>;

/// A command line with `{name}` placeholders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandTemplate(String);

impl CommandTemplate {
    #[must_use]
    pub fn new(line: impl Into<String>) -> Self {
        Self(line.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Placeholder names in order of appearance
    #[must_use]
    pub fn placeholders(&self) -> Vec<&str> {
        scan(&self.0).into_iter().map(|(_, name)| name).collect()
    }

    /// Substitute every placeholder from `vars`
    ///
    /// # Errors
    /// Returns [`RenderError::MissingParameter`] for the first placeholder
    /// without a value and [`RenderError::UnsafeValue`] for a value carrying
    /// quoting, command-separator or whitespace characters, or starting
    /// with `-`.
    pub fn render(&self, vars: &Vars) -> Result<String, RenderError> {
        for name in self.placeholders() {
            match vars.get(name) {
                None => return Err(RenderError::MissingParameter(name.to_string())),
                Some(value) if is_unsafe_value(value) => {
                    return Err(RenderError::UnsafeValue {
                        name: name.to_string(),
                    })
                }
                Some(_) => {}
            }
        }

        let mut rendered = String::with_capacity(self.0.len());
        let mut last = 0;
        for (span, name) in scan(&self.0) {
            rendered.push_str(&self.0[last..span.start]);
            rendered.push_str(vars.get(name).map_or("", String::as_str));
            last = span.end;
        }
        rendered.push_str(&self.0[last..]);

        tracing::debug!("rendered `{}`", rendered);
        Ok(rendered)
    }
}

/// `{identifier}` spans and their names
///
/// Braces around anything that is not an identifier (PowerShell script
/// blocks, JSON) are left alone.
fn scan(line: &str) -> Vec<(Range<usize>, &str)> {
    let mut found = Vec::new();
    let mut rest = 0;
    while let Some(open) = line[rest..].find('{').map(|i| rest + i) {
        let Some(close) = line[open + 1..].find('}').map(|i| open + 1 + i) else {
            break;
        };
        let name = &line[open + 1..close];
        let is_ident = name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if is_ident {
            found.push((open..close + 1, name));
            rest = close + 1;
        } else {
            rest = open + 1;
        }
    }
    found
}

impl From<&str> for CommandTemplate {
    fn from(line: &str) -> Self {
        Self::new(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vars {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn renders_all_placeholders() {
        let t = CommandTemplate::new("kubectl scale deployment/{target} --replicas={replicas} -n {namespace}");
        let line = t
            .render(&vars(&[("target", "api"), ("replicas", "3"), ("namespace", "prod")]))
            .unwrap();
        assert_eq!(line, "kubectl scale deployment/api --replicas=3 -n prod");
    }

    #[test]
    fn missing_parameter_is_an_error() {
        let t = CommandTemplate::new("kubectl scale deployment/{target} --replicas={replicas}");
        assert_eq!(
            t.render(&vars(&[("target", "api")])),
            Err(RenderError::MissingParameter("replicas".to_string()))
        );
    }

    #[test]
    fn values_cannot_break_quoting() {
        let t = CommandTemplate::new("Restart-Service -Name '{target}' -Force");
        assert_eq!(
            t.render(&vars(&[("target", "x'; Stop-Computer; '")])),
            Err(RenderError::UnsafeValue {
                name: "target".to_string()
            })
        );
    }

    #[test]
    fn values_cannot_add_arguments() {
        let t = CommandTemplate::new("kubectl delete pod {target} -n {namespace} --wait=false");
        for target in ["x --all", "x\t--all", "--all", "-A"] {
            assert_eq!(
                t.render(&vars(&[("target", target), ("namespace", "default")])),
                Err(RenderError::UnsafeValue {
                    name: "target".to_string()
                }),
                "{target:?}"
            );
        }
        assert!(t
            .render(&vars(&[("target", "api-7d4-x9"), ("namespace", "prod")]))
            .is_ok());
    }

    #[test]
    fn dangerous_but_quoted_tokens_still_render() {
        // Rendering is not the safety check; the validator sees this line.
        let t = CommandTemplate::new("Restart-Service -Name '{target}' -Force");
        let line = t.render(&vars(&[("target", "Format-Volume")])).unwrap();
        assert_eq!(line, "Restart-Service -Name 'Format-Volume' -Force");
    }

    #[test]
    fn script_blocks_are_not_placeholders() {
        let t = CommandTemplate::new("Get-Service | Where-Object { $_.Name -eq '{target}' }");
        assert_eq!(t.placeholders(), vec!["target"]);
        let line = t.render(&vars(&[("target", "spooler")])).unwrap();
        assert_eq!(line, "Get-Service | Where-Object { $_.Name -eq 'spooler' }");
    }

    #[test]
    fn placeholders_listed_in_order() {
        let t = CommandTemplate::new("aws rds failover-db-cluster --db-cluster-identifier {target} --target-db-instance-identifier {replica}");
        assert_eq!(t.placeholders(), vec!["target", "replica"]);
    }
}
