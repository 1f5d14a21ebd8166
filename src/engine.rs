use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::condition;
use crate::errors::AuthError;
use crate::settings::{Auth, AuthMode};
use crate::store::{AccessStore, SessionStore};
use crate::types::{
    Attributes, GrantedRule, Group, MatchMode, Relation, RuleSpec, RuleType, SubjectId,
};

/// Per-instance memoization of group, rule, and attribute lookups.
///
/// Lifetime is the Authorizer's lifetime: one resolution context. Locks are
/// never held across an await point.
#[derive(Debug, Default)]
struct ResolutionCache {
    groups: Mutex<HashMap<SubjectId, Arc<Vec<Group>>>>,
    rules: Mutex<HashMap<(SubjectId, RuleType), Arc<Vec<GrantedRule>>>>,
    attributes: Mutex<HashMap<SubjectId, Option<Arc<Attributes>>>>,
}

/// Rule-based authorization engine.
///
/// A subject belongs to groups, groups grant rule ids, and rules are named
/// permissions optionally gated by a condition over the subject's
/// attributes. `check` resolves the subject's effective rule set and matches
/// the requested names against it.
pub struct Authorizer<S> {
    auth: Auth,
    store: S,
    session: Option<Arc<dyn SessionStore>>,
    cache: ResolutionCache,
}

impl<S: AccessStore> Authorizer<S> {
    pub fn new(auth: Auth, store: S) -> Self {
        Self {
            auth,
            store,
            session: None,
            cache: ResolutionCache::default(),
        }
    }

    /// Attach session storage. Resolved rule lists are persisted there and
    /// reused across checks when `AuthMode::Session` is configured.
    pub fn with_session_store(mut self, session: Arc<dyn SessionStore>) -> Self {
        self.session = Some(session);
        self
    }

    /// Check whether `subject` holds the requested rule(s).
    ///
    /// `names` is a single rule name, a comma-separated list, or an explicit
    /// list; matching is case-insensitive. With `Relation::Or` one satisfied
    /// name passes the check; with `Relation::And` every requested name must
    /// be satisfied.
    ///
    /// `Err` means the backend could not answer. A `false` verdict is always
    /// a definite denial, so callers can tell "denied" from "undetermined".
    pub async fn check(
        &self,
        names: impl Into<RuleSpec>,
        subject: &SubjectId,
        rule_type: RuleType,
        mode: MatchMode,
        relation: Relation,
    ) -> Result<bool, AuthError> {
        if !self.auth.enabled {
            return Ok(true);
        }

        let spec = names.into();
        let requested = spec.names();
        let granted = self.effective_rules(subject, rule_type).await?;

        let mut matched: Vec<&str> = Vec::new();
        for rule in granted.iter() {
            match &mode {
                MatchMode::Params(observed) if !rule.params.is_empty() => {
                    if requested.iter().any(|name| *name == rule.base)
                        && rule.params_match(observed)
                    {
                        matched.push(&rule.base);
                    }
                }
                MatchMode::Params(_) => {
                    if requested.iter().any(|name| *name == rule.base) {
                        matched.push(&rule.base);
                    }
                }
                MatchMode::Plain => {
                    if requested.iter().any(|name| *name == rule.raw) {
                        matched.push(&rule.raw);
                    }
                }
            }
        }

        let verdict = match relation {
            Relation::Or => !matched.is_empty(),
            Relation::And => requested
                .iter()
                .all(|name| matched.iter().any(|m| *m == name.as_str())),
        };
        tracing::debug!(
            subject = %subject,
            requested = ?requested,
            matched = ?matched,
            verdict,
            "authorization check"
        );
        Ok(verdict)
    }

    /// The effective, deduplicated, lower-cased rule set for
    /// `(subject, rule_type)`. Used by `check` and exported for diagnostics.
    pub async fn effective_rules(
        &self,
        subject: &SubjectId,
        rule_type: RuleType,
    ) -> Result<Arc<Vec<GrantedRule>>, AuthError> {
        let key = (subject.clone(), rule_type);
        if let Some(cached) = self.cache.rules.lock().unwrap().get(&key) {
            return Ok(Arc::clone(cached));
        }

        if let Some(listed) = self.session_rules(subject, rule_type).await? {
            let resolved = Arc::new(listed);
            self.cache
                .rules
                .lock()
                .unwrap()
                .insert(key, Arc::clone(&resolved));
            return Ok(resolved);
        }

        let groups = self.groups(subject).await?;
        let mut ids = BTreeSet::new();
        for group in groups.iter() {
            ids.extend(group.rule_ids.iter().copied());
        }

        let resolved = if ids.is_empty() {
            Vec::new()
        } else {
            let ids: Vec<i64> = ids.into_iter().collect();
            let rows = self.store.find_rules_by_ids(&ids, rule_type).await?;

            let mut seen = HashSet::new();
            let mut resolved = Vec::new();
            for row in rows {
                if let Some(template) = row.condition.as_deref() {
                    if !self.condition_passes(subject, &row.name, template).await? {
                        continue;
                    }
                }
                let rule = GrantedRule::parse(&row.name);
                if seen.insert(rule.raw.clone()) {
                    resolved.push(rule);
                }
            }
            resolved
        };

        self.persist_session_rules(subject, rule_type, &resolved)
            .await?;
        tracing::debug!(
            subject = %subject,
            %rule_type,
            rules = resolved.len(),
            "resolved effective rule set"
        );

        let resolved = Arc::new(resolved);
        self.cache
            .rules
            .lock()
            .unwrap()
            .insert(key, Arc::clone(&resolved));
        Ok(resolved)
    }

    /// Active groups the subject belongs to, with their rule grants.
    /// Cached per subject; zero groups is not an error.
    pub async fn groups(&self, subject: &SubjectId) -> Result<Arc<Vec<Group>>, AuthError> {
        if let Some(cached) = self.cache.groups.lock().unwrap().get(subject) {
            return Ok(Arc::clone(cached));
        }
        let groups = Arc::new(self.store.find_active_groups(subject).await?);
        self.cache
            .groups
            .lock()
            .unwrap()
            .insert(subject.clone(), Arc::clone(&groups));
        Ok(groups)
    }

    /// Fail-closed condition gate: parse and evaluation faults exclude the
    /// rule and are reported, never propagated. Store failures do propagate.
    async fn condition_passes(
        &self,
        subject: &SubjectId,
        rule_name: &str,
        template: &str,
    ) -> Result<bool, AuthError> {
        let Some(attributes) = self.attributes(subject).await? else {
            tracing::debug!(
                subject = %subject,
                rule = rule_name,
                "no attribute record; conditioned rule excluded"
            );
            return Ok(false);
        };

        let outcome = condition::parse_condition(template)
            .and_then(|expr| condition::evaluate(&expr, &attributes));
        match outcome {
            Ok(passed) => Ok(passed),
            Err(err) => {
                tracing::warn!(
                    subject = %subject,
                    rule = rule_name,
                    error = %err,
                    "condition evaluation failed; rule excluded"
                );
                Ok(false)
            }
        }
    }

    async fn attributes(&self, subject: &SubjectId) -> Result<Option<Arc<Attributes>>, AuthError> {
        if let Some(cached) = self.cache.attributes.lock().unwrap().get(subject) {
            return Ok(cached.clone());
        }
        let attributes = self
            .store
            .find_subject_attributes(subject)
            .await?
            .map(Arc::new);
        self.cache
            .attributes
            .lock()
            .unwrap()
            .insert(subject.clone(), attributes.clone());
        Ok(attributes)
    }

    fn session_key(subject: &SubjectId, rule_type: RuleType) -> String {
        format!("auth:rules:{subject}:{rule_type}")
    }

    async fn session_rules(
        &self,
        subject: &SubjectId,
        rule_type: RuleType,
    ) -> Result<Option<Vec<GrantedRule>>, AuthError> {
        if self.auth.mode != AuthMode::Session {
            return Ok(None);
        }
        let Some(session) = &self.session else {
            return Ok(None);
        };
        let Some(value) = session.get(&Self::session_key(subject, rule_type)).await? else {
            return Ok(None);
        };
        let names: Vec<String> = serde_json::from_value(value)?;
        Ok(Some(names.iter().map(|name| GrantedRule::parse(name)).collect()))
    }

    async fn persist_session_rules(
        &self,
        subject: &SubjectId,
        rule_type: RuleType,
        rules: &[GrantedRule],
    ) -> Result<(), AuthError> {
        if self.auth.mode != AuthMode::Session {
            return Ok(());
        }
        let Some(session) = &self.session else {
            return Ok(());
        };
        let names: Vec<&str> = rules.iter().map(|rule| rule.raw.as_str()).collect();
        session
            .set(
                &Self::session_key(subject, rule_type),
                serde_json::json!(names),
            )
            .await
    }
}
