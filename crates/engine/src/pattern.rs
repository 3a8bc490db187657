//! Glob-style matching for operator commands and resource names.
//!
//! Patterns only know one metacharacter: `*` matches any run of characters. Everything
//! else is literal, so authored commands such as `kubectl get pods -l app=web` do not need
//! escaping.

use regex::Regex;
use tracing::warn;

/// Compiles a glob pattern into an anchored regular expression.
pub fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let body = pattern.split('*').map(regex::escape).collect::<Vec<_>>().join(".*");
    Regex::new(&format!("^{body}$"))
}

/// True when the submitted command matches the expected pattern.
///
/// Leading and trailing whitespace on both sides is ignored.
pub fn command_matches(pattern: &str, command: &str) -> bool {
    match glob_to_regex(pattern.trim()) {
        Ok(regex) => regex.is_match(command.trim()),
        Err(error) => {
            warn!(%pattern, %error, "command pattern could not be compiled");
            false
        }
    }
}

/// True when a resource name passes a name filter.
///
/// Filters containing `*` are matched as globs; plain filters match any name that contains
/// them, so `basic-deployment` selects the pods `basic-deployment-7d9f-abcde`.
pub fn name_matches(filter: &str, name: &str) -> bool {
    if !filter.contains('*') {
        return name.contains(filter);
    }
    match glob_to_regex(filter) {
        Ok(regex) => regex.is_match(name),
        Err(error) => {
            warn!(%filter, %error, "name filter could not be compiled");
            false
        }
    }
}
