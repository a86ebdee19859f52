//! Per-model pricing and append-only cost accounting.

#[cfg(test)]
mod tests;

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::warn;

/// USD cost per million tokens, split input/output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

/// Static longest-prefix-match pricing table. Small enough that a linear
/// scan over a sorted slice beats building a trie.
const PRICING_TABLE: &[(&str, Pricing)] = &[
    (
        "gpt-4o-mini",
        Pricing {
            input_per_million: 0.15,
            output_per_million: 0.60,
        },
    ),
    (
        "gpt-4o",
        Pricing {
            input_per_million: 2.50,
            output_per_million: 10.00,
        },
    ),
    (
        "gpt-4",
        Pricing {
            input_per_million: 30.00,
            output_per_million: 60.00,
        },
    ),
    (
        "gpt-3.5-turbo",
        Pricing {
            input_per_million: 0.50,
            output_per_million: 1.50,
        },
    ),
    (
        "claude-3-5-sonnet",
        Pricing {
            input_per_million: 3.00,
            output_per_million: 15.00,
        },
    ),
    (
        "claude-3-opus",
        Pricing {
            input_per_million: 15.00,
            output_per_million: 75.00,
        },
    ),
    (
        "claude-3-haiku",
        Pricing {
            input_per_million: 0.25,
            output_per_million: 1.25,
        },
    ),
];

/// Looks up pricing for `model` by longest matching prefix in
/// [`PRICING_TABLE`]. Unknown models yield `None`; callers treat that as
/// zero cost and log a warning.
pub fn lookup_pricing(model: &str) -> Option<Pricing> {
    PRICING_TABLE
        .iter()
        .filter(|(prefix, _)| model.starts_with(prefix))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, pricing)| *pricing)
}

#[derive(Debug, Clone)]
pub struct CostEntry {
    pub provider: String,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub cost_usd: f64,
}

/// Append-only ledger of cost entries with derived aggregations.
pub struct CostTracker {
    entries: RwLock<Vec<CostEntry>>,
}

impl Default for CostTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl CostTracker {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Computes the cost of this request from the pricing table, appends an
    /// entry, and returns the computed cost.
    pub fn track_request(
        &self,
        provider: &str,
        model: &str,
        prompt_tokens: u32,
        completion_tokens: u32,
    ) -> f64 {
        let cost = match lookup_pricing(model) {
            Some(pricing) => {
                (prompt_tokens as f64 / 1_000_000.0) * pricing.input_per_million
                    + (completion_tokens as f64 / 1_000_000.0) * pricing.output_per_million
            }
            None => {
                warn!(model, "no pricing entry for model, recording zero cost");
                0.0
            }
        };

        self.entries.write().push(CostEntry {
            provider: provider.to_string(),
            model: model.to_string(),
            prompt_tokens,
            completion_tokens,
            cost_usd: cost,
        });
        cost
    }

    pub fn total_cost(&self) -> f64 {
        self.entries.read().iter().map(|e| e.cost_usd).sum()
    }

    pub fn cost_by_provider(&self) -> HashMap<String, f64> {
        let mut totals = HashMap::new();
        for entry in self.entries.read().iter() {
            *totals.entry(entry.provider.clone()).or_insert(0.0) += entry.cost_usd;
        }
        totals
    }

    pub fn cost_by_model(&self) -> HashMap<String, f64> {
        let mut totals = HashMap::new();
        for entry in self.entries.read().iter() {
            *totals.entry(entry.model.clone()).or_insert(0.0) += entry.cost_usd;
        }
        totals
    }

    pub fn entry_count(&self) -> usize {
        self.entries.read().len()
    }
}
