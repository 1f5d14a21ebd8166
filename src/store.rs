use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::AuthError;
use crate::types::{Attributes, Group, RuleRow, RuleType, SubjectId};

/// Query surface the engine needs from the persistence backend.
///
/// Implementations apply the status filters themselves: only active groups,
/// and only active rules of the requested type, may be returned.
#[async_trait]
pub trait AccessStore: Send + Sync {
    /// Groups the subject belongs to, joined on membership, active only.
    /// A subject with no groups yields an empty list, not an error.
    async fn find_active_groups(&self, subject: &SubjectId) -> Result<Vec<Group>, AuthError>;

    /// Active rules of `rule_type` whose id is in `ids`.
    async fn find_rules_by_ids(
        &self,
        ids: &[i64],
        rule_type: RuleType,
    ) -> Result<Vec<RuleRow>, AuthError>;

    /// Flat attribute record for the subject, or `None` if it has none.
    async fn find_subject_attributes(
        &self,
        subject: &SubjectId,
    ) -> Result<Option<Attributes>, AuthError>;
}

/// Key-value storage that outlives a single check, used to carry resolved
/// rule lists across calls when the session auth mode is configured.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, AuthError>;
    async fn set(&self, key: &str, value: Value) -> Result<(), AuthError>;
}

/// In-memory `AccessStore` for tests and embedded deployments.
///
/// Holds active records only; there is no status column to filter on.
#[derive(Debug, Default)]
pub struct MemoryStore {
    groups: Mutex<HashMap<SubjectId, Vec<Group>>>,
    rules: Mutex<HashMap<i64, (RuleType, RuleRow)>>,
    attributes: Mutex<HashMap<SubjectId, Attributes>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_group(&self, subject: impl Into<SubjectId>, group: Group) {
        self.groups
            .lock()
            .unwrap()
            .entry(subject.into())
            .or_default()
            .push(group);
    }

    pub fn add_rule(&self, id: i64, rule_type: RuleType, name: &str, condition: Option<&str>) {
        self.rules.lock().unwrap().insert(
            id,
            (
                rule_type,
                RuleRow {
                    name: name.to_string(),
                    condition: condition.map(str::to_string),
                },
            ),
        );
    }

    pub fn set_attributes(&self, subject: impl Into<SubjectId>, attributes: Attributes) {
        self.attributes
            .lock()
            .unwrap()
            .insert(subject.into(), attributes);
    }
}

#[async_trait]
impl AccessStore for MemoryStore {
    async fn find_active_groups(&self, subject: &SubjectId) -> Result<Vec<Group>, AuthError> {
        Ok(self
            .groups
            .lock()
            .unwrap()
            .get(subject)
            .cloned()
            .unwrap_or_default())
    }

    async fn find_rules_by_ids(
        &self,
        ids: &[i64],
        rule_type: RuleType,
    ) -> Result<Vec<RuleRow>, AuthError> {
        let rules = self.rules.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| rules.get(id))
            .filter(|(ty, _)| *ty == rule_type)
            .map(|(_, row)| row.clone())
            .collect())
    }

    async fn find_subject_attributes(
        &self,
        subject: &SubjectId,
    ) -> Result<Option<Attributes>, AuthError> {
        Ok(self.attributes.lock().unwrap().get(subject).cloned())
    }
}

/// In-memory `SessionStore`, the default session backend.
#[derive(Debug, Default)]
pub struct MemorySession {
    values: Mutex<HashMap<String, Value>>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySession {
    async fn get(&self, key: &str) -> Result<Option<Value>, AuthError> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), AuthError> {
        self.values.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }
}
