//! Flow-ratio rebalancing for a droplet's pump group
//!
//! A droplet's ratio parameters (pump flow fractions) must sum to 1.
//! The generators pin the values they produced; the policies here decide
//! how the remaining members move to honor the unit total.

use crate::models::NormalizationPolicy;

/// Tolerance when checking that a rebalanced group sums to one
pub const RATIO_SUM_TOLERANCE: f64 = 1e-9;

/// One pump's share of the total flow while a group is rebalanced
#[derive(Debug, Clone, PartialEq)]
pub struct RatioShare {
    pub node_id: String,
    pub value: f64,
    /// Pinned by the generator (selected or swept); rebalancing must not
    /// overwrite it
    pub fixed: bool,
}

/// Rebalance a ratio group in place. Groups with fewer than two members
/// have no peers to balance against and are left untouched.
pub fn normalize(shares: &mut [RatioShare], policy: &NormalizationPolicy) {
    if shares.len() < 2 {
        return;
    }

    match policy {
        NormalizationPolicy::Distribute => distribute(shares),
        NormalizationPolicy::SingleBalance { balancing_node } => {
            single_balance(shares, balancing_node)
        }
    }
}

/// Pinned members keep their values; the remainder of the unit total is
/// spread across the rest in proportion to their raw shares.
fn distribute(shares: &mut [RatioShare]) {
    let pinned_total: f64 = shares.iter().filter(|s| s.fixed).map(|s| s.value).sum();
    let remaining = 1.0 - pinned_total;

    let free: Vec<usize> = shares
        .iter()
        .enumerate()
        .filter(|(_, s)| !s.fixed)
        .map(|(i, _)| i)
        .collect();
    if free.is_empty() {
        // Every member was pinned by the generator; nothing left to move
        return;
    }

    let free_total: f64 = free.iter().map(|&i| shares[i].value).sum();
    if free_total == 0.0 {
        // Equal split instead of dividing by zero
        let share = remaining / free.len() as f64;
        for &i in &free {
            shares[i].value = share;
        }
    } else {
        for &i in &free {
            shares[i].value = shares[i].value / free_total * remaining;
        }
    }
}

/// Every non-balancing member keeps its value; the balancing member
/// absorbs whatever is left, clamped at zero. When the others already
/// exceed 1 the group total cannot reach 1 — the clamp wins.
fn single_balance(shares: &mut [RatioShare], balancing_node: &str) {
    let others: f64 = shares
        .iter()
        .filter(|s| s.node_id != balancing_node)
        .map(|s| s.value)
        .sum();

    for share in shares.iter_mut() {
        if share.node_id == balancing_node {
            share.value = (1.0 - others).max(0.0);
        }
    }
}
