//! Droplet batch generation
//!
//! Turns a parameter catalog plus user choices into a complete batch of
//! droplets: builds the design or sweep values, rebalances ratio groups,
//! and merges everything with catalog defaults. Also owns the droplet
//! JSON document and the human-readable run table and summary.

use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use thiserror::Error;

use crate::design;
use crate::interpolate;
use crate::models::{
    Droplet, DropletParameter, NormalizationPolicy, ParameterSpec, ValueAssignment,
};
use crate::normalize::{self, RatioShare};

/// User-input validation failures, checked before any generation work
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("factorial designs need at least 2 selected parameters, got {selected}")]
    InsufficientFactors { selected: usize },

    #[error("sweep range is empty: min {min} is not below max {max}")]
    InvalidRange { min: f64, max: f64 },

    #[error("no droplets have been generated")]
    NoDropletsGenerated,
}

/// Merge generated values with catalog defaults into one droplet.
///
/// Emits exactly one entry per catalog parameter whose node is not
/// excluded, in catalog order. Id uniqueness within a batch is the
/// caller's responsibility.
pub fn assemble(
    id: &str,
    targets: &ValueAssignment,
    catalog: &[ParameterSpec],
    excluded: &HashSet<String>,
) -> Droplet {
    let parameters = catalog
        .iter()
        .filter(|spec| !excluded.contains(&spec.node_id))
        .map(|spec| DropletParameter {
            node_id: spec.node_id.clone(),
            node_name: spec.node_name.clone(),
            name: spec.name.clone(),
            default: spec.default,
            value: *targets.get(&spec.key()).unwrap_or(&spec.default),
        })
        .collect();

    Droplet {
        id: id.to_string(),
        parameters,
    }
}

/// Rebalance the ratio parameters of one droplet-to-be, pinning the
/// generated values, and fold the results back into `targets`.
///
/// The group is every non-excluded ratio parameter in the catalog;
/// members the generator did not touch enter at their defaults.
fn apply_ratio_policy(
    targets: &mut ValueAssignment,
    catalog: &[ParameterSpec],
    excluded: &HashSet<String>,
    policy: &NormalizationPolicy,
) {
    let group: Vec<&ParameterSpec> = catalog
        .iter()
        .filter(|spec| spec.is_ratio && !excluded.contains(&spec.node_id))
        .collect();
    if group.len() < 2 {
        return;
    }

    let mut shares: Vec<RatioShare> = group
        .iter()
        .map(|spec| match targets.get(&spec.key()) {
            Some(&value) => RatioShare {
                node_id: spec.node_id.clone(),
                value,
                fixed: true,
            },
            None => RatioShare {
                node_id: spec.node_id.clone(),
                value: spec.default,
                fixed: false,
            },
        })
        .collect();

    normalize::normalize(&mut shares, policy);

    for (spec, share) in group.iter().zip(&shares) {
        targets.insert(spec.key(), share.value);
    }
}

/// Reject single-balance setups that cannot work: the balancing node
/// must carry a ratio parameter and must not be one of the generated
/// (pinned) parameters.
fn validate_policy(
    catalog: &[ParameterSpec],
    policy: &NormalizationPolicy,
    excluded: &HashSet<String>,
    pinned: &[&ParameterSpec],
) -> Result<()> {
    let NormalizationPolicy::SingleBalance { balancing_node } = policy else {
        return Ok(());
    };

    let group: Vec<&ParameterSpec> = catalog
        .iter()
        .filter(|spec| spec.is_ratio && !excluded.contains(&spec.node_id))
        .collect();
    if group.len() < 2 {
        // No rebalancing will run, so there is nothing to check
        return Ok(());
    }

    if !group.iter().any(|spec| &spec.node_id == balancing_node) {
        return Err(anyhow!(
            "balancing node '{balancing_node}' has no ratio parameter in the catalog"
        ));
    }
    if pinned.iter().any(|spec| &spec.node_id == balancing_node) {
        return Err(anyhow!(
            "balancing node '{balancing_node}' cannot be one of the generated parameters"
        ));
    }

    Ok(())
}

/// Generate one droplet per design point over the selected parameters.
///
/// Selected parameters take their mapped level values, ratio groups are
/// rebalanced around them, everything else stays at catalog defaults.
/// Droplets come out in design order; no partial batch is ever returned.
pub fn factorial_batch(
    catalog: &[ParameterSpec],
    selected: &[(String, String)],
    policy: &NormalizationPolicy,
    excluded: &HashSet<String>,
    run_prefix: &str,
) -> Result<Vec<Droplet>> {
    if selected.len() < 2 {
        return Err(ValidationError::InsufficientFactors {
            selected: selected.len(),
        }
        .into());
    }

    let mut specs = Vec::with_capacity(selected.len());
    for (node_id, name) in selected {
        let spec = catalog
            .iter()
            .find(|s| &s.node_id == node_id && &s.name == name)
            .ok_or_else(|| anyhow!("unknown parameter '{node_id}:{name}'"))?;
        if excluded.contains(&spec.node_id) {
            return Err(anyhow!(
                "parameter '{node_id}:{name}' belongs to an excluded node"
            ));
        }
        specs.push(spec);
    }
    validate_policy(catalog, policy, excluded, &specs)?;

    let points = design::build_design(specs.len());

    let mut droplets = Vec::with_capacity(points.len());
    for (index, point) in points.iter().enumerate() {
        let mut targets = ValueAssignment::new();
        for (level, spec) in point.iter().zip(specs.iter()) {
            targets.insert(spec.key(), design::map_level(*level, spec));
        }

        apply_ratio_policy(&mut targets, catalog, excluded, policy);

        let id = format!("{run_prefix}-{:03}", index + 1);
        droplets.push(assemble(&id, &targets, catalog, excluded));
    }

    Ok(droplets)
}

/// Generate one droplet per sweep step across a single parameter.
///
/// A swept ratio parameter drives its group: the interpolated value is
/// pinned and the peers are rebalanced around it at every step.
pub fn sweep_batch(
    catalog: &[ParameterSpec],
    node_id: &str,
    name: &str,
    min: f64,
    max: f64,
    steps: usize,
    policy: &NormalizationPolicy,
    excluded: &HashSet<String>,
    run_prefix: &str,
) -> Result<Vec<Droplet>> {
    let spec = catalog
        .iter()
        .find(|s| s.node_id == node_id && s.name == name)
        .ok_or_else(|| anyhow!("unknown parameter '{node_id}:{name}'"))?;
    if excluded.contains(&spec.node_id) {
        return Err(anyhow!(
            "parameter '{node_id}:{name}' belongs to an excluded node"
        ));
    }
    if min >= max {
        return Err(ValidationError::InvalidRange { min, max }.into());
    }
    validate_policy(catalog, policy, excluded, &[spec])?;

    // Too few steps is clamped rather than rejected
    let steps = steps.max(2);
    let values = interpolate::interpolate(min, max, steps);

    let mut droplets = Vec::with_capacity(values.len());
    for (index, value) in values.iter().enumerate() {
        let mut targets = ValueAssignment::new();
        targets.insert(spec.key(), *value);

        apply_ratio_policy(&mut targets, catalog, excluded, policy);

        let id = format!("{run_prefix}-{:03}", index + 1);
        droplets.push(assemble(&id, &targets, catalog, excluded));
    }

    Ok(droplets)
}

/// Write a droplet batch as a pretty-printed JSON document
pub fn save_droplets(path: &Path, droplets: &[Droplet]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), droplets)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Read a droplet batch back from its JSON document
pub fn load_droplets(path: &Path) -> Result<Vec<Droplet>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let droplets = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(droplets)
}

/// Format a batch as a run table, one line per droplet
pub fn format_run_table(droplets: &[Droplet]) -> String {
    let mut output = String::new();
    let Some(first) = droplets.first() else {
        return output;
    };

    output.push_str(&format!("{:<5} {:<20}", "Run", "Droplet"));
    for param in &first.parameters {
        let heading = format!("{}:{}", param.node_name, param.name);
        output.push_str(&format!(" {:>24}", heading));
    }
    output.push('\n');

    for (index, droplet) in droplets.iter().enumerate() {
        output.push_str(&format!("{:<5} {:<20}", index + 1, droplet.id));
        for param in &droplet.parameters {
            output.push_str(&format!(" {:>24.3}", param.value));
        }
        output.push('\n');
    }

    output
}

/// Aggregate view of a generated or reloaded batch
#[derive(Debug)]
pub struct BatchSummary {
    pub droplet_count: usize,
    /// Per parameter: label, lowest and highest value across the batch
    pub parameter_ranges: Vec<(String, f64, f64)>,
    /// Droplet ids whose ratio group does not sum to 1
    pub unbalanced: Vec<String>,
}

/// Summarize a batch against the catalog (the catalog supplies the
/// ratio flags for the sum check)
pub fn summarize_batch(droplets: &[Droplet], catalog: &[ParameterSpec]) -> BatchSummary {
    let mut parameter_ranges = Vec::new();
    if let Some(first) = droplets.first() {
        for param in &first.parameters {
            let mut lo = f64::INFINITY;
            let mut hi = f64::NEG_INFINITY;
            for droplet in droplets {
                for p in &droplet.parameters {
                    if p.node_id == param.node_id && p.name == param.name {
                        lo = lo.min(p.value);
                        hi = hi.max(p.value);
                    }
                }
            }
            let label = format!("{}:{}", param.node_name, param.name);
            parameter_ranges.push((label, lo, hi));
        }
    }

    let ratio_keys: HashSet<(&str, &str)> = catalog
        .iter()
        .filter(|spec| spec.is_ratio)
        .map(|spec| (spec.node_id.as_str(), spec.name.as_str()))
        .collect();

    let mut unbalanced = Vec::new();
    for droplet in droplets {
        let group: Vec<f64> = droplet
            .parameters
            .iter()
            .filter(|p| ratio_keys.contains(&(p.node_id.as_str(), p.name.as_str())))
            .map(|p| p.value)
            .collect();
        if group.len() >= 2 {
            let sum: f64 = group.iter().sum();
            if (sum - 1.0).abs() > normalize::RATIO_SUM_TOLERANCE {
                unbalanced.push(droplet.id.clone());
            }
        }
    }

    BatchSummary {
        droplet_count: droplets.len(),
        parameter_ranges,
        unbalanced,
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Batch Summary ===")?;
        writeln!(f, "Droplets: {}", self.droplet_count)?;
        writeln!(f)?;

        writeln!(f, "Parameter ranges:")?;
        for (label, lo, hi) in &self.parameter_ranges {
            writeln!(f, "  {:<32} {:>10.3} .. {:.3}", label, lo, hi)?;
        }

        if !self.unbalanced.is_empty() {
            writeln!(f)?;
            writeln!(
                f,
                "Ratio sums away from 1 in: {}",
                self.unbalanced.join(", ")
            )?;
        }

        Ok(())
    }
}
