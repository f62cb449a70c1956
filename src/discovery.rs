use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::models::ExpectedSet;
use crate::runner::TestDiscovery;

/// Expected tests known up front.
pub struct StaticDiscovery {
    expected: ExpectedSet,
}

impl StaticDiscovery {
    pub fn new(expected: ExpectedSet) -> Self {
        Self { expected }
    }
}

#[async_trait]
impl TestDiscovery for StaticDiscovery {
    async fn expected_test_set(&self) -> Result<ExpectedSet> {
        Ok(self.expected.clone())
    }
}

/// Expected tests read from a JSON manifest mapping class names to their
/// test methods, e.g. `{"FooTest": ["m1", "m2"]}`.
pub struct ManifestDiscovery {
    path: PathBuf,
}

impl ManifestDiscovery {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TestDiscovery for ManifestDiscovery {
    async fn expected_test_set(&self) -> Result<ExpectedSet> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read test manifest {}", self.path.display()))?;
        let manifest: BTreeMap<String, Vec<String>> = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse test manifest {}", self.path.display()))?;

        let mut expected = ExpectedSet::new();
        for (class_name, methods) in manifest {
            if methods.is_empty() {
                anyhow::bail!("test class '{}' in manifest lists no methods", class_name);
            }
            for method in methods {
                expected.insert(class_name.as_str(), method);
            }
        }
        Ok(expected)
    }
}
