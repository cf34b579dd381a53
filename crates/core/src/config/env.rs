//! Deployment environments and environment-variable helpers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Deployment environment. Anything but production runs dry by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

/// Gateway run next to a local node.
const LOCAL_GATEWAY: &str = "http://localhost:9955";

impl Environment {
    /// Parse a known environment name.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim() {
            "development" => Some(Self::Development),
            "staging" => Some(Self::Staging),
            "production" => Some(Self::Production),
            _ => None,
        }
    }

    /// Like [`Environment::parse`], falling back to development.
    pub fn resolve(name: Option<&str>) -> Self {
        name.and_then(Self::parse).unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }

    /// Built-in gateway endpoints. Only development has one; staging and
    /// production gateways must be configured explicitly.
    pub fn default_endpoints(&self) -> Vec<String> {
        match self {
            Self::Development => vec![LOCAL_GATEWAY.to_string()],
            Self::Staging | Self::Production => Vec::new(),
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expand `${VAR_NAME}` patterns using `lookup`. Unknown variables are left as is.
pub fn expand_env<F>(s: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let Ok(re) = regex_lite::Regex::new(r"\$\{([^}]+)\}") else {
        return s.to_string();
    };

    let mut result = s.to_string();
    for cap in re.captures_iter(s) {
        if let (Some(full_match), Some(var_match)) = (cap.get(0), cap.get(1)) {
            if let Some(value) = lookup(var_match.as_str()) {
                result = result.replace(full_match.as_str(), &value);
            }
        }
    }
    result
}

/// Split a comma-separated endpoint list, dropping blanks.
pub fn split_endpoints(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a boolean flag (`1`/`true`/`yes`/`on` and their negatives).
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_environment() {
        assert_eq!(Environment::resolve(Some("production")), Environment::Production);
        assert_eq!(Environment::resolve(Some("staging")), Environment::Staging);
        assert_eq!(Environment::resolve(Some("test")), Environment::Development);
        assert_eq!(Environment::resolve(None), Environment::Development);
    }

    #[test]
    fn test_default_endpoints() {
        assert_eq!(Environment::Development.default_endpoints(), vec!["http://localhost:9955"]);
        assert!(Environment::Staging.default_endpoints().is_empty());
        assert!(Environment::Production.default_endpoints().is_empty());
    }

    #[test]
    fn test_split_endpoints() {
        assert_eq!(
            split_endpoints(" http://10.0.0.5:9955, https://gw.example/rpc ,"),
            vec!["http://10.0.0.5:9955", "https://gw.example/rpc"]
        );
        assert!(split_endpoints("").is_empty());
    }

    #[test]
    fn test_expand_env() {
        let lookup = |name: &str| (name == "NODE_HOST").then(|| "10.0.0.5".to_string());
        assert_eq!(expand_env("ws://${NODE_HOST}:9944", lookup), "ws://10.0.0.5:9944");
        assert_eq!(expand_env("ws://${UNSET}:9944", lookup), "ws://${UNSET}:9944");
        assert_eq!(expand_env("no_vars", lookup), "no_vars");
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
