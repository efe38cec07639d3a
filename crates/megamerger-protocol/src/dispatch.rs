//! Status/Event Dispatch - a `(status, event kind) -> action` table.
//!
//! Actions are plain function pointers over the state they drive. A lookup
//! that finds no rule is the caller's nil action.

use std::collections::HashMap;
use std::hash::Hash;

use crate::error::Result;

/// Signature shared by every action.
pub type Action<T, E> = fn(&mut T, E) -> Result<()>;

/// A named action.
pub struct Rule<T, E> {
    /// Name used in logs
    pub name: &'static str,
    /// Handler
    pub action: Action<T, E>,
}

impl<T, E> Clone for Rule<T, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, E> Copy for Rule<T, E> {}

impl<T, E> std::fmt::Debug for Rule<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule").field("name", &self.name).finish()
    }
}

/// Table from `(status, kind)` to a [`Rule`].
pub struct DispatchTable<S, K, T, E> {
    rules: HashMap<(S, K), Rule<T, E>>,
}

impl<S, K, T, E> Default for DispatchTable<S, K, T, E> {
    fn default() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }
}

impl<S, K, T, E> std::fmt::Debug for DispatchTable<S, K, T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchTable")
            .field("rules", &self.rules.len())
            .finish()
    }
}

impl<S, K, T, E> DispatchTable<S, K, T, E>
where
    S: Copy + Eq + Hash,
    K: Copy + Eq + Hash,
{
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `action` for every status in `statuses` on `kind`.
    ///
    /// A later registration for the same pair replaces the earlier one.
    pub fn add_rule(
        &mut self,
        statuses: &[S],
        kind: K,
        name: &'static str,
        action: Action<T, E>,
    ) -> &mut Self {
        for &status in statuses {
            self.rules.insert((status, kind), Rule { name, action });
        }
        self
    }

    /// The rule for `(status, kind)`, if any.
    #[must_use]
    pub fn lookup(&self, status: S, kind: K) -> Option<Rule<T, E>> {
        self.rules.get(&(status, kind)).copied()
    }

    /// True if a rule exists for `(status, kind)`.
    #[must_use]
    pub fn handles(&self, status: S, kind: K) -> bool {
        self.rules.contains_key(&(status, kind))
    }

    /// Run the matching rule on `target`.
    ///
    /// Returns `Ok(None)` without touching `target` when there is no rule.
    pub fn dispatch(
        &self,
        status: S,
        kind: K,
        target: &mut T,
        event: E,
    ) -> Result<Option<&'static str>> {
        match self.lookup(status, kind) {
            Some(rule) => {
                (rule.action)(target, event)?;
                Ok(Some(rule.name))
            }
            None => Ok(None),
        }
    }

    /// Number of `(status, kind)` pairs with a rule.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True if no rule is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Light {
        Off,
        On,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Press {
        Toggle,
        Reset,
    }

    #[derive(Default)]
    struct Lamp {
        light: Option<Light>,
        presses: u32,
    }

    fn turn_on(lamp: &mut Lamp, n: u32) -> Result<()> {
        lamp.light = Some(Light::On);
        lamp.presses += n;
        Ok(())
    }

    fn turn_off(lamp: &mut Lamp, n: u32) -> Result<()> {
        lamp.light = Some(Light::Off);
        lamp.presses += n;
        Ok(())
    }

    fn table() -> DispatchTable<Light, Press, Lamp, u32> {
        let mut table = DispatchTable::new();
        table
            .add_rule(&[Light::Off], Press::Toggle, "turn on", turn_on)
            .add_rule(&[Light::On], Press::Toggle, "turn off", turn_off)
            .add_rule(&[Light::On, Light::Off], Press::Reset, "reset", turn_off);
        table
    }

    #[test]
    fn dispatch_runs_matching_rule() {
        let table = table();
        let mut lamp = Lamp::default();
        let name = table.dispatch(Light::Off, Press::Toggle, &mut lamp, 2).unwrap();
        assert_eq!(name, Some("turn on"));
        assert_eq!(lamp.light, Some(Light::On));
        assert_eq!(lamp.presses, 2);
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn missing_rule_leaves_target_untouched() {
        let mut table = table();
        let mut lamp = Lamp::default();
        table.rules.remove(&(Light::On, Press::Reset));
        assert!(!table.handles(Light::On, Press::Reset));
        let name = table.dispatch(Light::On, Press::Reset, &mut lamp, 1).unwrap();
        assert_eq!(name, None);
        assert_eq!(lamp.presses, 0);
        assert!(lamp.light.is_none());
    }

    #[test]
    fn later_rule_replaces_earlier() {
        let mut table = table();
        table.add_rule(&[Light::Off], Press::Toggle, "stay off", turn_off);
        assert_eq!(table.lookup(Light::Off, Press::Toggle).map(|r| r.name), Some("stay off"));
        assert_eq!(table.len(), 4);
    }
}
