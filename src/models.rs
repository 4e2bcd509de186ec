//! Data models for the flow-graph catalog and generated droplets

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One node of the imported flow graph
#[derive(Debug, Clone, PartialEq)]
pub struct FlowNode {
    pub id: String,
    pub node_type: String,
    pub label: String,
    /// Fixed continuous-phase pump, excluded from generation
    pub carrier: bool,
    /// End-stage node (e.g. outlet thermostat), excluded from the droplet table
    pub end_stage: bool,
}

/// One selectable parameter on a flow-graph node
///
/// Identity is the (node_id, name) pair. Specs are read fresh from the
/// catalog for every generation call and never cached across calls.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    pub node_id: String,
    pub node_name: String,
    pub name: String,
    pub label: String,
    pub min: f64,
    pub max: f64,
    pub default: f64,
    pub unit: String,
    /// Must sum to 1 with its peers on sibling pump nodes
    pub is_ratio: bool,
}

impl ParameterSpec {
    /// Catalog identity of this parameter
    pub fn key(&self) -> (String, String) {
        (self.node_id.clone(), self.name.clone())
    }
}

/// Concrete values keyed by parameter identity, produced by the design
/// and sweep generators and consumed by the droplet assembler
pub type ValueAssignment = HashMap<(String, String), f64>;

/// How a droplet's flow-ratio group is rebalanced to sum to 1
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizationPolicy {
    /// Scale every unpinned member proportionally over the remainder
    Distribute,
    /// Keep the other members as-is; one balancing node absorbs the rest
    SingleBalance { balancing_node: String },
}

/// One complete experiment condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Droplet {
    pub id: String,
    pub parameters: Vec<DropletParameter>,
}

/// A single parameter entry inside a droplet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropletParameter {
    pub node_id: String,
    pub node_name: String,
    pub name: String,
    pub default: f64,
    pub value: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn droplet_document_round_trips_structurally() {
        let droplet = Droplet {
            id: "1754000000000-001".to_string(),
            parameters: vec![DropletParameter {
                node_id: "pump-a".to_string(),
                node_name: "Reagent A".to_string(),
                name: "flow_fraction".to_string(),
                default: 0.4,
                value: 0.55,
            }],
        };

        let json = serde_json::to_string(&droplet).unwrap();
        let reloaded: Droplet = serde_json::from_str(&json).unwrap();
        assert_eq!(droplet, reloaded);
    }
}
