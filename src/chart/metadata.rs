use serde::{Deserialize, Deserializer};

/// Accepts YAML scalars of any type as a string (`appVersion: 1.19` is a float
/// in YAML but a version string to us).
fn deserialize_scalar_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<serde_yaml::Value> = Option::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_yaml::Value::String(s)) => s,
        Some(serde_yaml::Value::Number(n)) => n.to_string(),
        Some(serde_yaml::Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    })
}

fn deserialize_optional_scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = deserialize_scalar_string(deserializer)?;
    Ok(Some(s).filter(|s| !s.trim().is_empty()))
}

/// A maintainer as declared in `Chart.yaml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
pub struct ChartMaintainer {
    #[serde(default, deserialize_with = "deserialize_scalar_string")]
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_scalar_string")]
    pub email: String,
    #[serde(default, deserialize_with = "deserialize_optional_scalar")]
    pub url: Option<String>,
}

/// The subset of `Chart.yaml` the tracker cares about.
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    #[serde(default, deserialize_with = "deserialize_optional_scalar")]
    pub api_version: Option<String>,
    #[serde(default, deserialize_with = "deserialize_scalar_string")]
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_scalar_string")]
    pub version: String,
    #[serde(default, deserialize_with = "deserialize_optional_scalar")]
    pub description: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_optional_scalar")]
    pub home: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_scalar")]
    pub app_version: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_scalar")]
    pub icon: Option<String>,
    #[serde(default)]
    pub maintainers: Vec<ChartMaintainer>,
    #[serde(default)]
    pub deprecated: bool,
}
