//! # Component Dependency Graph
//!
//! Turns `(sls_path, order)` pairs into salt orchestrate stages. Each stage
//! targets the minions of its scope carrying the sls as a role, and requires
//! every sls at the **nearest lower populated order**. Components sharing an
//! order form a wave with no ordering between them; waves run in order.
//!
//! Orders need not be contiguous or start at zero here. Blueprint validation
//! owns those rules; this builder only walks down to the next populated order.

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::{BTreeMap, BTreeSet};

use crate::models::{EntityKey, FormulaComponent};

/// Which minions a graph's stages target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GraphScope {
    /// Members of one stack or environment
    Entity(EntityKey),
    /// Every minion launched into a cloud account
    CloudAccount(String),
}

impl GraphScope {
    fn base_target(&self) -> String {
        match self {
            Self::Entity(entity) => entity.salt_target(),
            Self::CloudAccount(slug) => format!("G@cloud_account:{slug}"),
        }
    }

    /// Compound target for the minions of this scope carrying `sls_path`
    pub fn target_for(&self, sls_path: &str) -> String {
        format!("{} and G@roles:{}", self.base_target(), sls_path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestrationStage {
    pub sls_path: String,
    pub order: u32,
    pub target: String,
    pub requires: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestrationGraph {
    pub scope: GraphScope,
    /// Sorted by order, then sls path
    pub stages: Vec<OrchestrationStage>,
}

/// Distinct sls paths grouped by order. A path seen at several orders keeps
/// the highest one.
pub fn order_waves(components: &[FormulaComponent]) -> BTreeMap<u32, BTreeSet<String>> {
    let mut orders: BTreeMap<&str, u32> = BTreeMap::new();
    for component in components {
        let order = orders.entry(component.sls_path.as_str()).or_insert(component.order);
        *order = (*order).max(component.order);
    }

    let mut waves: BTreeMap<u32, BTreeSet<String>> = BTreeMap::new();
    for (sls_path, order) in orders {
        waves.entry(order).or_default().insert(sls_path.to_string());
    }
    waves
}

/// Every sls at the closest populated order strictly below `order`
pub fn nearest_lower_dependencies(
    waves: &BTreeMap<u32, BTreeSet<String>>,
    order: u32,
) -> Vec<String> {
    waves
        .range(..order)
        .next_back()
        .map(|(_, wave)| wave.iter().cloned().collect())
        .unwrap_or_default()
}

impl OrchestrationGraph {
    pub fn build(scope: GraphScope, components: &[FormulaComponent]) -> Self {
        let waves = order_waves(components);
        let stages = waves
            .iter()
            .flat_map(|(&order, wave)| {
                let requires = nearest_lower_dependencies(&waves, order);
                let scope = &scope;
                wave.iter().map(move |sls_path| OrchestrationStage {
                    sls_path: sls_path.clone(),
                    order,
                    target: scope.target_for(sls_path),
                    requires: requires.clone(),
                })
            })
            .collect();

        Self { scope, stages }
    }

    pub fn stage(&self, sls_path: &str) -> Option<&OrchestrationStage> {
        self.stages.iter().find(|stage| stage.sls_path == sls_path)
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Salt orchestrate document: one `salt.state` stage per sls
    pub fn to_yaml(&self) -> Value {
        let mut document = Mapping::new();
        for stage in &self.stages {
            let mut args = vec![
                single("tgt", Value::String(stage.target.clone())),
                single("tgt_type", Value::String("compound".to_string())),
                single(
                    "sls",
                    Value::Sequence(vec![Value::String(stage.sls_path.clone())]),
                ),
                single("queue", Value::Bool(true)),
            ];
            if !stage.requires.is_empty() {
                let requires = stage
                    .requires
                    .iter()
                    .map(|dep| single("salt", Value::String(dep.clone())))
                    .collect();
                args.push(single("require", Value::Sequence(requires)));
            }

            let mut state = Mapping::new();
            state.insert(Value::String("salt.state".to_string()), Value::Sequence(args));
            document.insert(Value::String(stage.sls_path.clone()), Value::Mapping(state));
        }
        Value::Mapping(document)
    }
}

fn single(key: &str, value: Value) -> Value {
    let mut map = Mapping::new();
    map.insert(Value::String(key.to_string()), value);
    Value::Mapping(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn components(pairs: &[(&str, u32)]) -> Vec<FormulaComponent> {
        pairs
            .iter()
            .map(|(sls, order)| FormulaComponent::new(*sls, *order))
            .collect()
    }

    #[test]
    fn test_nearest_lower_order_with_gaps() {
        let graph = OrchestrationGraph::build(
            GraphScope::Entity(EntityKey::Stack(1)),
            &components(&[("A", 0), ("B", 0), ("C", 1), ("D", 3)]),
        );

        assert!(graph.stage("A").unwrap().requires.is_empty());
        assert!(graph.stage("B").unwrap().requires.is_empty());
        assert_eq!(graph.stage("C").unwrap().requires, vec!["A", "B"]);
        assert_eq!(graph.stage("D").unwrap().requires, vec!["C"]);
    }

    #[test]
    fn test_non_zero_based_orders() {
        let graph = OrchestrationGraph::build(
            GraphScope::Entity(EntityKey::Stack(1)),
            &components(&[("base", 5), ("app", 9)]),
        );
        assert!(graph.stage("base").unwrap().requires.is_empty());
        assert_eq!(graph.stage("app").unwrap().requires, vec!["base"]);
    }

    #[test]
    fn test_duplicates_collapse_to_one_stage() {
        let graph = OrchestrationGraph::build(
            GraphScope::Entity(EntityKey::Stack(1)),
            &components(&[("common", 0), ("common", 0), ("web", 1)]),
        );
        assert_eq!(graph.stages.len(), 2);
    }

    #[test]
    fn test_scoped_targets() {
        let stack = GraphScope::Entity(EntityKey::Stack(3));
        assert_eq!(stack.target_for("web"), "G@stack_id:3 and G@roles:web");
        let global = GraphScope::CloudAccount("aws-east".into());
        assert_eq!(
            global.target_for("dns"),
            "G@cloud_account:aws-east and G@roles:dns"
        );
    }

    #[test]
    fn test_yaml_document_shape() {
        let graph = OrchestrationGraph::build(
            GraphScope::Entity(EntityKey::Stack(1)),
            &components(&[("db", 0), ("web", 1)]),
        );
        let yaml = serde_yaml::to_string(&graph.to_yaml()).unwrap();
        let parsed: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();

        let web_args = parsed["web"]["salt.state"].as_sequence().unwrap();
        assert_eq!(web_args[0]["tgt"], "G@stack_id:1 and G@roles:web");
        assert_eq!(web_args[1]["tgt_type"], "compound");
        assert_eq!(web_args[4]["require"][0]["salt"], "db");
        assert_eq!(parsed["db"]["salt.state"].as_sequence().unwrap().len(), 4);
    }
}
