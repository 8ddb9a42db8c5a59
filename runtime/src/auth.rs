//! Request credential enrichment.
//!
//! Two forms are supported, chosen by [`AuthConfig`](crate::config::AuthConfig):
//!
//! - **Header templates**: header values containing `#path.to.state` tokens
//!   are interpolated against the state tree. Unresolved tokens are left as
//!   `#<first segment>` and a warning is logged.
//! - **State selectors**: a declarative list of dotted paths resolved against
//!   the state tree. Included values are merged into the request parameters;
//!   a forbidden path that resolves fails the call before it is issued.
//!
//! The state tree is the JSON serialization of the store's state snapshot.

use composable_api_core::action::Params;
use composable_api_core::transport::Headers;
use composable_api_core::{ApiError, Value};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

#[allow(clippy::expect_used)] // Literal pattern, checked by tests
static TOKEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#(\w+\.?)+").expect("token pattern is valid"));

/// What a selector does with the value it finds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorRule {
    /// Merge the value into the request parameters
    #[default]
    Include,
    /// Fail the call if the value exists
    Forbid,
}

/// A dotted path into the state tree
///
/// # Example
///
/// ```
/// use composable_api_runtime::auth::{select, StateSelector};
/// use serde_json::json;
///
/// let state = json!({"user": {"sessionid": "abc"}});
/// let params = select(&[StateSelector::include("user.sessionid")], &state).unwrap_or_default();
/// assert_eq!(params.get("sessionid"), Some(&json!("abc")));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateSelector {
    /// Dotted path, e.g. `user.sessionid`
    pub path: String,
    /// Parameter name; defaults to the last path segment
    #[serde(default)]
    pub param: Option<String>,
    /// What to do with the value
    #[serde(default)]
    pub rule: SelectorRule,
}

impl StateSelector {
    /// Merge the value at `path` into the parameters
    #[must_use]
    pub fn include(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            param: None,
            rule: SelectorRule::Include,
        }
    }

    /// Fail the call when `path` resolves
    #[must_use]
    pub fn forbid(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            param: None,
            rule: SelectorRule::Forbid,
        }
    }

    /// Use `name` as the parameter name
    #[must_use]
    pub fn as_param(mut self, name: impl Into<String>) -> Self {
        self.param = Some(name.into());
        self
    }

    /// Name under which the value is merged
    #[must_use]
    pub fn param_name(&self) -> &str {
        self.param
            .as_deref()
            .or_else(|| self.path.rsplit('.').next())
            .unwrap_or(&self.path)
    }
}

/// Serialize a state snapshot into the tree paths are resolved against
pub fn state_tree<S: Serialize>(state: &S) -> Value {
    serde_json::to_value(state).unwrap_or_else(|error| {
        tracing::warn!(%error, "State snapshot could not be serialized, auth lookups will miss");
        Value::Null
    })
}

/// Resolve a dotted path; `null` counts as absent
pub fn lookup<'a>(tree: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(tree, |current, segment| match current {
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => current.get(segment),
        })
        .filter(|value| !value.is_null())
}

/// Replace every `#path.to.state` token in `template`
#[must_use]
pub fn interpolate(template: &str, tree: &Value) -> String {
    TOKEN_PATTERN
        .replace_all(template, |captures: &Captures<'_>| {
            let token = captures
                .get(0)
                .map_or("", |m| m.as_str())
                .trim_start_matches('#');

            match lookup(tree, token) {
                Some(Value::String(value)) => value.clone(),
                Some(value) => value.to_string(),
                None => {
                    let first = token.split('.').next().unwrap_or(token);
                    tracing::warn!(
                        template,
                        property = first,
                        "Tried to substitute template but couldn't find property in the state"
                    );
                    format!("#{first}")
                }
            }
        })
        .into_owned()
}

/// Interpolate every header template
#[must_use]
pub fn interpolate_headers(templates: &BTreeMap<String, String>, tree: &Value) -> Headers {
    templates
        .iter()
        .map(|(name, template)| (name.clone(), interpolate(template, tree)))
        .collect()
}

/// Resolve selectors into request parameters
///
/// # Errors
///
/// Returns [`ApiError::ForbiddenStateValue`] when a [`SelectorRule::Forbid`]
/// path resolves.
pub fn select(selectors: &[StateSelector], tree: &Value) -> Result<Params, ApiError> {
    let mut params = Params::new();

    for selector in selectors {
        match (selector.rule, lookup(tree, &selector.path)) {
            (SelectorRule::Include, Some(value)) => {
                params.insert(selector.param_name().to_string(), value.clone());
            }
            (SelectorRule::Include, None) => {
                tracing::warn!(
                    path = %selector.path,
                    "Tried reaching path that couldn't be found in the state tree"
                );
            }
            (SelectorRule::Forbid, Some(_)) => {
                return Err(ApiError::ForbiddenStateValue {
                    path: selector.path.clone(),
                });
            }
            (SelectorRule::Forbid, None) => {}
        }
    }

    Ok(params)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use serde_json::json;

    fn tree() -> Value {
        json!({
            "user": {"sessionid": "abc123", "id": 42, "roles": ["admin", "dev"]},
            "flags": {"banned": null},
        })
    }

    #[test]
    fn test_interpolates_nested_tokens() {
        assert_eq!(interpolate("Bearer #user.sessionid", &tree()), "Bearer abc123");
        assert_eq!(interpolate("#user.id/#user.roles.1", &tree()), "42/dev");
    }

    #[test]
    fn test_unresolved_token_keeps_first_segment() {
        assert_eq!(interpolate("Bearer #session.token", &tree()), "Bearer #session");
        assert_eq!(interpolate("#flags.banned", &tree()), "#flags");
    }

    #[test]
    fn test_plain_template_is_untouched() {
        assert_eq!(interpolate("static-value", &tree()), "static-value");
    }

    #[test]
    fn test_interpolate_headers() {
        let mut templates = BTreeMap::new();
        templates.insert("Authorization".to_string(), "Token #user.sessionid".to_string());
        let headers = interpolate_headers(&templates, &tree());
        assert_eq!(headers.get("Authorization").unwrap(), "Token abc123");
    }

    #[test]
    fn test_select_includes_and_renames() {
        let params = select(
            &[
                StateSelector::include("user.sessionid"),
                StateSelector::include("user.id").as_param("user_id"),
                StateSelector::include("user.missing"),
            ],
            &tree(),
        )
        .unwrap();

        assert_eq!(params.get("sessionid"), Some(&json!("abc123")));
        assert_eq!(params.get("user_id"), Some(&json!(42)));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_forbidden_path_fails() {
        let error = select(&[StateSelector::forbid("user.sessionid")], &tree()).unwrap_err();
        assert_eq!(
            error,
            ApiError::ForbiddenStateValue {
                path: "user.sessionid".to_string()
            }
        );

        assert!(select(&[StateSelector::forbid("flags.banned")], &tree()).is_ok());
    }

    #[test]
    fn test_selector_deserializes_from_toml() {
        let selector: StateSelector =
            toml::from_str("path = \"user.sessionid\"\nrule = \"forbid\"").unwrap();
        assert_eq!(selector, StateSelector::forbid("user.sessionid"));
    }
}
