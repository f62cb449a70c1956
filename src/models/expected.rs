use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::store::ResultStore;

/// One entry of a submission: a class and the methods to run in it.
/// An empty method list runs every method of the class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestItem {
    pub class_name: String,
    #[serde(default)]
    pub methods: Vec<String>,
}

impl TestItem {
    pub fn class(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            methods: Vec::new(),
        }
    }

    pub fn methods<I, S>(class_name: impl Into<String>, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            class_name: class_name.into(),
            methods: methods.into_iter().map(Into::into).collect(),
        }
    }
}

/// The tests a run should end up with results for: class name to method names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpectedSet {
    classes: BTreeMap<String, BTreeSet<String>>,
}

impl ExpectedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, class_name: impl Into<String>, method_name: impl Into<String>) {
        self.classes
            .entry(class_name.into())
            .or_default()
            .insert(method_name.into());
    }

    pub fn is_empty(&self) -> bool {
        self.classes.values().all(BTreeSet::is_empty)
    }

    pub fn method_count(&self) -> usize {
        self.classes.values().map(BTreeSet::len).sum()
    }

    pub fn classes(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.classes.iter().map(|(c, m)| (c.as_str(), m))
    }

    /// Everything expected that has no result in `store` yet, grouped by class.
    pub fn missing(&self, store: &ResultStore) -> ExpectedSet {
        let mut missing = ExpectedSet::new();
        for (class_name, methods) in &self.classes {
            for method in methods {
                if !store.contains_key(&format!("{}.{}", class_name, method)) {
                    missing.insert(class_name.as_str(), method.as_str());
                }
            }
        }
        missing
    }

    /// Submission items naming each remaining method explicitly.
    pub fn items(&self) -> Vec<TestItem> {
        self.classes
            .iter()
            .filter(|(_, methods)| !methods.is_empty())
            .map(|(class_name, methods)| TestItem::methods(class_name.as_str(), methods.iter().cloned()))
            .collect()
    }
}

impl<C, M> FromIterator<(C, M)> for ExpectedSet
where
    C: Into<String>,
    M: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (C, M)>>(iter: T) -> Self {
        let mut set = ExpectedSet::new();
        for (class_name, method) in iter {
            set.insert(class_name, method);
        }
        set
    }
}
