use serde::{Deserialize, Serialize};

use super::ChartRepository;

/// A package maintainer. Only maintainers with an email are kept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Maintainer {
    pub name: String,
    pub email: String,
}

/// A catalog entry for one chart version.
///
/// Identified by (repository, name, version).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Package {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
    #[serde(default)]
    pub content_url: String,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_image_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub maintainers: Vec<Maintainer>,
    #[serde(default)]
    pub signed: bool,
    #[serde(default)]
    pub deprecated: bool,
    pub repository: Option<ChartRepository>,
}

impl Package {
    /// Minimal package carrying only its identity, as used for unregistration.
    pub fn identity(repository: &ChartRepository, name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            repository: Some(repository.clone()),
            ..Default::default()
        }
    }

    pub fn repository_id(&self) -> Option<&str> {
        self.repository.as_ref().map(|r| r.repository_id.as_str())
    }

    /// True when both packages denote the same catalog entry.
    pub fn same_identity(&self, other: &Package) -> bool {
        self.repository_id() == other.repository_id()
            && self.name == other.name
            && self.version == other.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_package() {
        let repo = ChartRepository::new("repo-1", "stable", "https://charts.example.com");
        let pkg = Package::identity(&repo, "nginx", "1.0.0");
        assert_eq!(pkg.name, "nginx");
        assert_eq!(pkg.version, "1.0.0");
        assert_eq!(pkg.repository_id(), Some("repo-1"));
        assert!(pkg.digest.is_empty());
    }

    #[test]
    fn test_same_identity_ignores_content() {
        let repo = ChartRepository::new("repo-1", "stable", "https://charts.example.com");
        let a = Package::identity(&repo, "nginx", "1.0.0");
        let mut b = a.clone();
        b.digest = "other".to_string();
        assert!(a.same_identity(&b));

        let other_repo = ChartRepository::new("repo-2", "incubator", "https://example.org");
        let c = Package::identity(&other_repo, "nginx", "1.0.0");
        assert!(!a.same_identity(&c));
    }
}
