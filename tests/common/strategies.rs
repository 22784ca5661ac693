//! proptest strategies for the health and status enumerations and for
//! formula component sets.

#![allow(dead_code)]

use proptest::prelude::*;
use stackd_core::models::{ComponentStatus, FormulaComponent, Health};

pub fn health_strategy() -> impl Strategy<Value = Health> {
    proptest::sample::select(Health::ALL.to_vec())
}

pub fn status_strategy() -> impl Strategy<Value = ComponentStatus> {
    proptest::sample::select(ComponentStatus::ALL.to_vec())
}

/// Components with unique sls paths and orders in `0..6`
pub fn components_strategy() -> impl Strategy<Value = Vec<FormulaComponent>> {
    proptest::collection::btree_map("[a-z]{1,8}", 0u32..6, 1..12).prop_map(|entries| {
        entries
            .into_iter()
            .map(|(sls, order)| FormulaComponent::new(sls, order))
            .collect()
    })
}
