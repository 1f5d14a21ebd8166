use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of the entity being authorized.
///
/// Opaque to the engine; the storage backend decides whether the underlying
/// primary key is numeric or textual.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SubjectId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SubjectId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<i64> for SubjectId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rule family discriminator.
///
/// Rules and checks carry a type so that realtime and login-scoped rule sets
/// can coexist in one rule table. Deployments may define further families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleType(pub i32);

impl RuleType {
    /// Default family, re-evaluated on every check.
    pub const REALTIME: RuleType = RuleType(1);
    /// Family resolved once at login time.
    pub const LOGIN: RuleType = RuleType(2);
}

impl Default for RuleType {
    fn default() -> Self {
        Self::REALTIME
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An active group a subject belongs to, with the rule ids granted to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub id: i64,
    pub title: String,
    pub rule_ids: Vec<i64>,
}

/// A rule definition as fetched from the store: the stored name plus the
/// optional condition template gating it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleRow {
    pub name: String,
    pub condition: Option<String>,
}

/// Flat attribute record for one subject.
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// Observed request parameters consulted by parameter-aware matching.
pub type Params = HashMap<String, String>;

/// A granted rule name, parsed once at resolution time.
///
/// Stored rule names may embed a query suffix (`order/edit?status=1`) that
/// constrains the grant to requests whose observed parameters contain every
/// suffix pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantedRule {
    /// Full lower-cased name as stored, suffix included.
    pub raw: String,
    /// Name with any `?suffix` stripped.
    pub base: String,
    /// Key/value constraints parsed from the suffix, in suffix order.
    pub params: Vec<(String, String)>,
}

impl GrantedRule {
    pub fn parse(name: &str) -> Self {
        let raw = name.to_lowercase();
        match raw.split_once('?') {
            Some((base, query)) => {
                let params = query
                    .split('&')
                    .filter(|pair| !pair.is_empty())
                    .map(|pair| match pair.split_once('=') {
                        Some((k, v)) => (k.to_string(), v.to_string()),
                        None => (pair.to_string(), String::new()),
                    })
                    .collect();
                Self {
                    base: base.to_string(),
                    params,
                    raw: raw.clone(),
                }
            }
            None => Self {
                base: raw.clone(),
                params: Vec::new(),
                raw,
            },
        }
    }

    /// True when every suffix constraint is present and equal in `observed`.
    /// The observed set may contain extra keys.
    pub fn params_match(&self, observed: &Params) -> bool {
        self.params
            .iter()
            .all(|(k, v)| observed.get(k).map(String::as_str) == Some(v.as_str()))
    }
}

impl fmt::Display for GrantedRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Caller-requested rule names: a single name, a comma-separated list, or an
/// explicit list. Entries are lower-cased on intake.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RuleSpec(Vec<String>);

impl RuleSpec {
    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for RuleSpec {
    fn from(names: &str) -> Self {
        Self(
            names
                .to_lowercase()
                .split(',')
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect(),
        )
    }
}

impl From<String> for RuleSpec {
    fn from(names: String) -> Self {
        Self::from(names.as_str())
    }
}

impl From<Vec<String>> for RuleSpec {
    fn from(names: Vec<String>) -> Self {
        Self(names.into_iter().map(|name| name.to_lowercase()).collect())
    }
}

impl From<&[&str]> for RuleSpec {
    fn from(names: &[&str]) -> Self {
        Self(names.iter().map(|name| name.to_lowercase()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for RuleSpec {
    fn from(names: [&str; N]) -> Self {
        Self::from(&names[..])
    }
}

/// Whether rule matching also consults observed request parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MatchMode {
    /// Requested names must match stored entries verbatim.
    #[default]
    Plain,
    /// Entries with a query suffix additionally require every suffix pair to
    /// appear in the observed parameters.
    Params(Params),
}

impl MatchMode {
    /// Parameter-aware matching over the given observed parameters,
    /// lower-cased the same way stored rule names are.
    pub fn params<K, V, I>(observed: I) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::Params(
            observed
                .into_iter()
                .map(|(k, v)| (k.as_ref().to_lowercase(), v.as_ref().to_lowercase()))
                .collect(),
        )
    }
}

/// Combination policy across multiple requested rule names in one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Relation {
    /// Any single requested rule passing passes the check.
    #[default]
    Or,
    /// Every requested rule must pass.
    And,
}
