//! Portcullis - rule-based authorization
//!
//! A subject belongs to groups, groups grant rule ids, and rules are named
//! permissions optionally gated by a condition expression over the subject's
//! attributes. [`Authorizer::check`] resolves the subject's effective rule
//! set and matches requested names under AND/OR and parameter-aware
//! semantics.

pub mod condition;
pub mod engine;
pub mod errors;
pub mod settings;
pub mod storage;
pub mod store;
pub mod types;

pub use engine::Authorizer;
pub use errors::AuthError;
pub use settings::{AuthMode, Settings};
pub use store::{AccessStore, MemorySession, MemoryStore, SessionStore};
pub use types::{GrantedRule, MatchMode, Relation, RuleSpec, RuleType, SubjectId};
