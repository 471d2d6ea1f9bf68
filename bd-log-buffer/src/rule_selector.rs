// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#[cfg(test)]
#[path = "./rule_selector_test.rs"]
mod rule_selector_test;

use crate::config::{FilterRule, RuleAttribute};
use arc_swap::ArcSwap;
use bd_log_primitives::{EventId, LogAttribute, LogLevel};
use dashmap::DashMap;
use std::sync::Arc;

// Upper bound on the number of distinct (level, event id) pairs remembered per selector. Event ids
// are chosen by producers and are not guaranteed to be a small set; past this point selection
// keeps working, it just isn't memoized.
const MAX_CACHED_KEYS: usize = 1024;

// Returns whether `category` is matched by `pattern`. A missing pattern matches everything. The
// pattern is split at its (single) '*' into a prefix and a suffix; the category must start with the
// prefix and end with the suffix, ignoring case. A pattern without a wildcard is a prefix match.
#[must_use]
pub fn category_matches(pattern: Option<&str>, category: &str) -> bool {
  let Some(pattern) = pattern else {
    return true;
  };

  let (prefix, suffix) = pattern.split_once('*').unwrap_or((pattern, ""));
  let category = category.to_lowercase();

  category.starts_with(&prefix.to_lowercase()) && category.ends_with(&suffix.to_lowercase())
}

// Narrows a rule list down to the rules that can apply to `category`, preserving their order.
#[must_use]
pub fn select_by_category(rules: &[FilterRule], category: &str) -> Vec<FilterRule> {
  rules
    .iter()
    .filter(|rule| category_matches(rule.category_pattern.as_deref(), category))
    .cloned()
    .collect()
}

fn level_and_event_id_match(rule: &FilterRule, level: LogLevel, event_id: i32) -> bool {
  rule.max_level.is_none_or(|max_level| level <= max_level)
    && rule.event_id.is_none_or(|id| id == event_id)
}

fn event_name_matches(rule: &FilterRule, event_id: &EventId<'_>) -> bool {
  rule
    .event_name
    .as_deref()
    .is_none_or(|name| event_id.name == Some(name))
}

fn attributes_match(required: &[RuleAttribute], attributes: &[LogAttribute<'_>]) -> bool {
  required.iter().all(|required| {
    attributes
      .iter()
      .any(|attribute| attribute.key == required.key && attribute.value.string_eq(&required.value))
  })
}

//
// SelectorState
//

// A rule list together with the memoized level/event id matches computed against it. The two are
// always published together so a cached entry can never refer to a different rule list.
struct SelectorState {
  rules: Arc<[Arc<FilterRule>]>,

  // Indices into `rules` of the rules whose level and event id constraints accept the key.
  cache: DashMap<(LogLevel, i32), Arc<[usize]>, ahash::RandomState>,
}

impl SelectorState {
  fn new(rules: Arc<[Arc<FilterRule>]>) -> Self {
    Self {
      rules,
      cache: DashMap::with_hasher(ahash::RandomState::new()),
    }
  }

  fn candidates(&self, level: LogLevel, event_id: i32) -> Arc<[usize]> {
    let key = (level, event_id);
    if let Some(cached) = self.cache.get(&key) {
      return cached.clone();
    }

    let computed: Arc<[usize]> = self
      .rules
      .iter()
      .enumerate()
      .filter(|(_, rule)| level_and_event_id_match(rule, level, event_id))
      .map(|(index, _)| index)
      .collect();

    // Concurrent misses may compute the same value, the first insert wins.
    if self.cache.len() < MAX_CACHED_KEYS {
      return self.cache.entry(key).or_insert(computed).clone();
    }

    computed
  }
}

//
// RuleSelector
//

// Picks the single best rule for a record out of the rules that apply to one category.
pub struct RuleSelector {
  state: ArcSwap<SelectorState>,
}

impl RuleSelector {
  #[must_use]
  pub fn new(rules: Vec<FilterRule>) -> Self {
    Self {
      state: ArcSwap::from_pointee(SelectorState::new(Self::share(rules))),
    }
  }

  #[must_use]
  pub fn for_category(rules: &[FilterRule], category: &str) -> Self {
    Self::new(select_by_category(rules, category))
  }

  fn share(rules: Vec<FilterRule>) -> Arc<[Arc<FilterRule>]> {
    rules.into_iter().map(Arc::new).collect()
  }

  // Replaces the rule list. This also drops every cached match.
  pub fn update_rules(&self, rules: Vec<FilterRule>) {
    self
      .state
      .store(Arc::new(SelectorState::new(Self::share(rules))));
  }

  // Drops every cached match while keeping the current rules. A selection that is already running
  // may still finish against the previous cache, but only writes into the retired copy.
  pub fn invalidate_cache(&self) {
    self
      .state
      .rcu(|state| SelectorState::new(state.rules.clone()));
  }

  #[must_use]
  pub fn rule_count(&self) -> usize {
    self.state.load().rules.len()
  }

  #[must_use]
  pub fn cached_keys(&self) -> usize {
    self.state.load().cache.len()
  }

  // Returns the most specific rule matching the record, if any. Rules requiring more attributes
  // are more specific; on equal specificity the earlier rule wins.
  #[must_use]
  pub fn select(
    &self,
    level: LogLevel,
    event_id: &EventId<'_>,
    attributes: &[LogAttribute<'_>],
  ) -> Option<Arc<FilterRule>> {
    let state = self.state.load();
    if state.rules.is_empty() {
      return None;
    }

    let mut best: Option<&Arc<FilterRule>> = None;
    for rule in state
      .candidates(level, event_id.id)
      .iter()
      .filter_map(|index| state.rules.get(*index))
    {
      if !event_name_matches(rule, event_id)
        || !attributes_match(rule.required_attributes(), attributes)
      {
        continue;
      }

      best = match best {
        Some(current)
          if rule.required_attributes().len() <= current.required_attributes().len() =>
        {
          Some(current)
        },
        _ => Some(rule),
      };
    }

    best.cloned()
  }
}
