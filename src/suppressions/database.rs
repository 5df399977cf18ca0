//! Run-wide suppression database
//!
//! One owned table behind a lock. Workers never hold references into it: they
//! receive copies of the global rules when their engine is built and write back
//! explicit deltas through [`SharedSuppressions::reconcile`] after every unit.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{RuleKey, SuppressionRule};
use crate::engine::Finding;

/// An inline rule that was already registered by an earlier unit
#[derive(Debug, Clone)]
pub struct SuppressionConflict {
    pub rule: SuppressionRule,
}

impl fmt::Display for SuppressionConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Suppression '{}' is already registered; duplicate ignored",
            self.rule
        )
    }
}

impl std::error::Error for SuppressionConflict {}

/// Mapping from rule identity to rule
#[derive(Debug, Default)]
pub struct SuppressionDatabase {
    rules: BTreeMap<RuleKey, SuppressionRule>,
}

impl SuppressionDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a database from global rules. Repeated rules keep the first copy.
    pub fn from_rules(rules: impl IntoIterator<Item = SuppressionRule>) -> Self {
        let mut db = Self::new();
        for rule in rules {
            if let Err(conflict) = db.add(rule) {
                tracing::debug!("{}", conflict);
            }
        }
        db
    }

    /// Insert a rule. First writer wins: an equivalent rule already present is
    /// left untouched and the new one comes back as a conflict.
    pub fn add(&mut self, rule: SuppressionRule) -> Result<(), SuppressionConflict> {
        let key = rule.key();
        if self.rules.contains_key(&key) {
            return Err(SuppressionConflict { rule });
        }
        self.rules.insert(key, rule);
        Ok(())
    }

    /// Fold the matched state of `rule` into the stored copy.
    /// Idempotent; never clears a matched flag. Returns false when the rule is unknown.
    pub fn update_state(&mut self, rule: &SuppressionRule) -> bool {
        match self.rules.get_mut(&rule.key()) {
            Some(existing) => {
                existing.matched |= rule.matched;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, key: &RuleKey) -> Option<&SuppressionRule> {
        self.rules.get(key)
    }

    pub fn rules(&self) -> impl Iterator<Item = &SuppressionRule> {
        self.rules.values()
    }

    /// Copies of the rules supplied up front (everything not discovered inline)
    pub fn global_rules(&self) -> Vec<SuppressionRule> {
        self.rules
            .values()
            .filter(|rule| !rule.is_inline)
            .cloned()
            .collect()
    }

    pub fn is_suppressed(&self, finding: &Finding) -> bool {
        self.rules.values().any(|rule| rule.matches(finding))
    }

    /// Rules that never fired during the run. File-local global rules are
    /// excluded: their state is only tracked by the engine checking that file.
    pub fn unmatched(&self) -> Vec<SuppressionRule> {
        self.rules
            .values()
            .filter(|rule| !rule.matched && (rule.is_inline || !rule.is_local()))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Lock-guarded handle to the database shared by all workers of a run
#[derive(Debug, Default)]
pub struct SharedSuppressions {
    db: Mutex<SuppressionDatabase>,
}

impl SharedSuppressions {
    pub fn new(db: SuppressionDatabase) -> Self {
        Self { db: Mutex::new(db) }
    }

    fn lock(&self) -> MutexGuard<'_, SuppressionDatabase> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copies of the global rules, used to seed a worker's private engine
    pub fn snapshot_global(&self) -> Vec<SuppressionRule> {
        self.lock().global_rules()
    }

    pub fn is_suppressed(&self, finding: &Finding) -> bool {
        self.lock().is_suppressed(finding)
    }

    /// Fold the suppression state of one finished unit back into the database:
    /// - inline rules are added (duplicates are not inserted, only their
    ///   matched state is kept, and they come back as conflicts)
    /// - global rules that are not file-local propagate their matched state
    /// - local non-inline rules only concern one file and are left alone
    pub fn reconcile(&self, rules: Vec<SuppressionRule>) -> Vec<SuppressionConflict> {
        let mut conflicts = Vec::new();
        let mut db = self.lock();

        for rule in rules {
            if rule.is_inline {
                if let Err(conflict) = db.add(rule) {
                    db.update_state(&conflict.rule);
                    conflicts.push(conflict);
                }
            } else if !rule.is_local() {
                db.update_state(&rule);
            }
        }

        conflicts
    }

    pub fn get(&self, key: &RuleKey) -> Option<SuppressionRule> {
        self.lock().get(key).cloned()
    }

    pub fn unmatched(&self) -> Vec<SuppressionRule> {
        self.lock().unmatched()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn into_inner(self) -> SuppressionDatabase {
        self.db.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}
