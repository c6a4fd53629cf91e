use serde::{Deserialize, Serialize};
use std::fmt;

/// A tracked chart repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ChartRepository {
    pub repository_id: String,
    pub name: String,
    /// Base URL; `index.yaml` and relative chart URLs are resolved against it.
    pub url: String,
}

impl ChartRepository {
    pub fn new(
        repository_id: impl Into<String>,
        name: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            repository_id: repository_id.into(),
            name: name.into(),
            url: url.into(),
        }
    }
}

impl fmt::Display for ChartRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.url)
    }
}
