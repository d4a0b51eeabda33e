//! `${NAME}` environment placeholders in configuration values.

use serde_yaml::Value;
use serde_yaml::value::TaggedValue;

/// Replace every string of the exact form `${NAME}` with the value of the
/// environment variable `NAME`, recursively.
///
/// Unset variables keep the literal placeholder.
pub fn resolve_env_vars(value: Value) -> Value {
    match value {
        Value::String(raw) => Value::String(resolve_env_placeholder(&raw)),
        Value::Sequence(items) => {
            Value::Sequence(items.into_iter().map(resolve_env_vars).collect())
        }
        Value::Mapping(map) => Value::Mapping(
            map.into_iter()
                .map(|(key, value)| (key, resolve_env_vars(value)))
                .collect(),
        ),
        Value::Tagged(tagged) => {
            let TaggedValue { tag, value } = *tagged;
            Value::Tagged(Box::new(TaggedValue {
                tag,
                value: resolve_env_vars(value),
            }))
        }
        other => other,
    }
}

/// Resolve a single `${NAME}` placeholder.
pub fn resolve_env_placeholder(raw: &str) -> String {
    placeholder_name(raw)
        .and_then(|name| std::env::var(name).ok())
        .unwrap_or_else(|| raw.to_string())
}

/// Everything between `${` and the closing `}`. Names the platform cannot
/// look up (empty, or containing `=` or NUL) are never set.
fn placeholder_name(raw: &str) -> Option<&str> {
    let name = raw.strip_prefix("${")?.strip_suffix('}')?;
    let valid = !name.is_empty() && !name.contains(['=', '\0']);
    valid.then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_name() {
        assert_eq!(placeholder_name("${API_KEY}"), Some("API_KEY"));
        assert_eq!(placeholder_name("${}"), None);
        assert_eq!(placeholder_name("prefix ${API_KEY}"), None);
        assert_eq!(placeholder_name("${API-KEY}"), Some("API-KEY"));
        assert_eq!(placeholder_name("${sink.token}"), Some("sink.token"));
        assert_eq!(placeholder_name("${A=B}"), None);
        assert_eq!(placeholder_name("API_KEY"), None);
    }

    #[test]
    fn test_resolves_nested_values() {
        // PATH is set in any test environment.
        let path = std::env::var("PATH").unwrap();
        let value: Value = serde_yaml::from_str(
            r#"
sink:
  api_key: ${PATH}
list: ["${PATH}", plain]
"#,
        )
        .unwrap();

        let resolved = resolve_env_vars(value);
        assert_eq!(resolved["sink"]["api_key"].as_str(), Some(path.as_str()));
        assert_eq!(resolved["list"][0].as_str(), Some(path.as_str()));
        assert_eq!(resolved["list"][1].as_str(), Some("plain"));
    }

    #[test]
    fn test_resolves_non_identifier_names() {
        // SAFETY: no other test reads or writes this variable.
        unsafe { std::env::set_var("POLICY_AGENT-TEST.DOTTED", "dotted") };
        assert_eq!(resolve_env_placeholder("${POLICY_AGENT-TEST.DOTTED}"), "dotted");
    }

    #[test]
    fn test_unset_variable_keeps_placeholder() {
        let raw = "${POLICY_AGENT_TEST_SURELY_UNSET_VARIABLE}";
        assert_eq!(resolve_env_placeholder(raw), raw);
    }
}
