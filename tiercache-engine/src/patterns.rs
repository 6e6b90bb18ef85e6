//! Pattern rule registry.
//!
//! Rules are kept in registration order; the first matching rule wins.
//! Registering a rule under an existing name replaces it in place.

use std::sync::RwLock;

use tiercache_core::PatternRule;

use crate::scheduler::TaskId;

struct PatternSlot {
    rule: PatternRule,
    /// Periodic scan armed for interval-refresh rules.
    timer: Option<TaskId>,
}

#[derive(Default)]
pub struct PatternRegistry {
    slots: RwLock<Vec<PatternSlot>>,
}

impl PatternRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a rule. Returns the timer of a replaced rule so the
    /// caller can cancel it.
    pub fn insert(&self, rule: PatternRule, timer: Option<TaskId>) -> Option<TaskId> {
        let Ok(mut slots) = self.slots.write() else {
            return None;
        };
        match slots.iter_mut().find(|slot| slot.rule.name == rule.name) {
            Some(slot) => {
                slot.rule = rule;
                std::mem::replace(&mut slot.timer, timer)
            }
            None => {
                slots.push(PatternSlot { rule, timer });
                None
            }
        }
    }

    /// Remove a rule by name, returning it and its timer.
    pub fn remove(&self, name: &str) -> Option<(PatternRule, Option<TaskId>)> {
        let mut slots = self.slots.write().ok()?;
        let position = slots.iter().position(|slot| slot.rule.name == name)?;
        let slot = slots.remove(position);
        Some((slot.rule, slot.timer))
    }

    /// First rule matching `key`.
    pub fn find(&self, key: &str) -> Option<PatternRule> {
        let slots = self.slots.read().ok()?;
        slots
            .iter()
            .find(|slot| slot.rule.matches(key))
            .map(|slot| slot.rule.clone())
    }

    pub fn get(&self, name: &str) -> Option<PatternRule> {
        let slots = self.slots.read().ok()?;
        slots
            .iter()
            .find(|slot| slot.rule.name == name)
            .map(|slot| slot.rule.clone())
    }

    pub fn rules(&self) -> Vec<PatternRule> {
        self.slots
            .read()
            .map(|slots| slots.iter().map(|slot| slot.rule.clone()).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.slots.read().map(|slots| slots.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
