// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Label-affinity selectors.
//!
//! A [`Selector`] is a disjunction of sub-conditions, each a conjunction of
//! label expressions with a weight. Preferred selectors score candidates;
//! required selectors filter them. The scheduler-decision engine and the
//! resource-group policies both build their placement rules from these.

use serde::{Deserialize, Serialize};

/// Highest weight a sub-condition can carry.
pub const MAX_PRIORITY_SCORE: i64 = 100;
/// Weight decrement per sub-condition when order expresses priority.
pub const PRIORITY_DECREMENT: i64 = 10;

/// One label predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelOp {
    In(Vec<String>),
    NotIn(Vec<String>),
    Exists,
    DoesNotExist,
}

/// A keyed label predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelExpression {
    pub key: String,
    pub op: LabelOp,
}

impl LabelExpression {
    pub fn label_in(key: impl Into<String>, values: Vec<String>) -> Self {
        Self { key: key.into(), op: LabelOp::In(values) }
    }

    pub fn label_not_in(key: impl Into<String>, values: Vec<String>) -> Self {
        Self { key: key.into(), op: LabelOp::NotIn(values) }
    }

    pub fn exists(key: impl Into<String>) -> Self {
        Self { key: key.into(), op: LabelOp::Exists }
    }

    pub fn does_not_exist(key: impl Into<String>) -> Self {
        Self { key: key.into(), op: LabelOp::DoesNotExist }
    }

    /// Evaluate against a label set of `key` or `key:value` entries.
    pub fn matches(&self, labels: &[String]) -> bool {
        let values: Vec<&str> = labels
            .iter()
            .filter_map(|l| match l.split_once(':') {
                Some((k, v)) if k == self.key => Some(v),
                None if *l == self.key => Some(""),
                _ => None,
            })
            .collect();
        match &self.op {
            LabelOp::In(wanted) => values.iter().any(|v| wanted.iter().any(|w| w == v)),
            LabelOp::NotIn(unwanted) => {
                !values.is_empty() && values.iter().all(|v| !unwanted.iter().any(|w| w == v))
            }
            LabelOp::Exists => !values.is_empty(),
            LabelOp::DoesNotExist => values.is_empty(),
        }
    }
}

/// Conjunction of expressions with a score weight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub expressions: Vec<LabelExpression>,
    pub weight: i64,
}

/// A filtering (required) or scoring (preferred) rule set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Selector {
    /// When true, earlier sub-conditions carry higher weight.
    pub order_priority: bool,
    pub sub_conditions: Vec<Condition>,
}

impl Selector {
    /// Build a selector from groups of expressions. With `order_priority`
    /// the weight steps down [`PRIORITY_DECREMENT`] per group.
    pub fn new(order_priority: bool, groups: Vec<Vec<LabelExpression>>) -> Self {
        let sub_conditions = groups
            .into_iter()
            .enumerate()
            .map(|(i, expressions)| Condition {
                expressions,
                weight: if order_priority {
                    MAX_PRIORITY_SCORE - PRIORITY_DECREMENT * i as i64
                } else {
                    MAX_PRIORITY_SCORE
                },
            })
            .collect();
        Self { order_priority, sub_conditions }
    }

    pub fn is_empty(&self) -> bool {
        self.sub_conditions.is_empty()
    }

    /// True if any expression in any sub-condition uses `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.sub_conditions
            .iter()
            .any(|c| c.expressions.iter().any(|e| e.key == key))
    }

    /// Remove every expression keyed by `key`, dropping emptied
    /// sub-conditions and recomputing weights.
    pub fn erase_key(&mut self, key: &str) {
        self.sub_conditions.iter_mut().for_each(|c| c.expressions.retain(|e| e.key != key));
        self.sub_conditions.retain(|c| !c.expressions.is_empty());
        for (i, c) in self.sub_conditions.iter_mut().enumerate() {
            c.weight = if self.order_priority {
                MAX_PRIORITY_SCORE - PRIORITY_DECREMENT * i as i64
            } else {
                MAX_PRIORITY_SCORE
            };
        }
    }

    /// True when all-required matching succeeds: some sub-condition has
    /// every expression matching the label set.
    pub fn matches(&self, labels: &[String]) -> bool {
        self.sub_conditions.is_empty()
            || self
                .sub_conditions
                .iter()
                .any(|c| c.expressions.iter().all(|e| e.matches(labels)))
    }

    /// Sum of weights of fully-matching sub-conditions.
    pub fn score(&self, labels: &[String]) -> i64 {
        self.sub_conditions
            .iter()
            .filter(|c| c.expressions.iter().all(|e| e.matches(labels)))
            .map(|c| c.weight)
            .sum()
    }
}

/// Affinity rules attached to a schedule request or bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Affinity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<Selector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_anti: Option<Selector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred: Option<Selector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_anti: Option<Selector>,
}

impl Affinity {
    /// serde `skip_serializing_if` helper.
    pub fn is_empty_ref(affinity: &Affinity) -> bool {
        affinity.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.required.is_none()
            && self.required_anti.is_none()
            && self.preferred.is_none()
            && self.preferred_anti.is_none()
    }

    /// True if any selector references `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        [&self.required, &self.required_anti, &self.preferred, &self.preferred_anti]
            .into_iter()
            .flatten()
            .any(|s| s.contains_key(key))
    }

    /// Fill selector slots this affinity leaves unset from `other`.
    /// Existing selectors win; used to layer policy rules under user rules.
    pub fn merge_missing(&mut self, other: Affinity) {
        if self.required.is_none() {
            self.required = other.required;
        }
        if self.required_anti.is_none() {
            self.required_anti = other.required_anti;
        }
        if self.preferred.is_none() {
            self.preferred = other.preferred;
        }
        if self.preferred_anti.is_none() {
            self.preferred_anti = other.preferred_anti;
        }
    }

    /// Remove `key` from every selector.
    pub fn erase_key(&mut self, key: &str) {
        for s in [
            self.required.as_mut(),
            self.required_anti.as_mut(),
            self.preferred.as_mut(),
            self.preferred_anti.as_mut(),
        ]
        .into_iter()
        .flatten()
        {
            s.erase_key(key);
        }
    }
}

#[cfg(test)]
#[path = "affinity_tests.rs"]
mod tests;
