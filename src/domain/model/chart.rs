use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Deserialize an optional timestamp, treating unparseable values as absent
fn deserialize_lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok().map(|t| t.with_timezone(&Utc))))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

/// Deserialize a scalar that may be null as a string (`version: 2.0` is a
/// float in YAML)
fn deserialize_nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let opt: Option<Scalar> = Option::deserialize(deserializer)?;
    Ok(match opt {
        Some(Scalar::String(s)) => s,
        Some(Scalar::Int(i)) => i.to_string(),
        Some(Scalar::Float(f)) => f.to_string(),
        Some(Scalar::Bool(b)) => b.to_string(),
        None => String::new(),
    })
}

/// One published version of a chart, as listed in a repository index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChartVersion {
    #[serde(default, deserialize_with = "deserialize_nullable_string")]
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_nullable_string")]
    pub version: String,
    #[serde(default, deserialize_with = "deserialize_nullable_string")]
    pub digest: String,
    /// Archive locations; only the first one is used.
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_timestamp")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl ChartVersion {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Default::default()
        }
    }

    /// Catalog key for this version, `<name>@<version>`.
    pub fn key(&self) -> String {
        package_key(&self.name, &self.version)
    }

    /// The archive URL as published in the index, if any.
    pub fn archive_url(&self) -> Option<&str> {
        self.urls.first().map(String::as_str).filter(|u| !u.trim().is_empty())
    }

    /// Creation time as unix seconds, 0 when the index does not say.
    pub fn created_unix(&self) -> i64 {
        self.created.map(|t| t.timestamp()).unwrap_or_default()
    }
}

/// Builds the composite key used by digest maps.
pub fn package_key(name: &str, version: &str) -> String {
    format!("{}@{}", name, version)
}

/// Splits a `<name>@<version>` key. Returns `None` for keys without both parts.
///
/// Splits at the last `@`: versions never contain one, chart names may.
pub fn parse_package_key(key: &str) -> Option<(&str, &str)> {
    key.rsplit_once('@')
        .filter(|(name, version)| !name.is_empty() && !version.is_empty())
}
