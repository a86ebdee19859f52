use super::*;

#[test]
fn longest_prefix_wins_over_shorter_match() {
    let pricing = lookup_pricing("gpt-4o-mini-2024-07-18").unwrap();
    assert_eq!(pricing, lookup_pricing("gpt-4o-mini").unwrap());
    assert_ne!(pricing, lookup_pricing("gpt-4o").unwrap());
}

#[test]
fn unknown_model_has_no_pricing() {
    assert!(lookup_pricing("some-unreleased-model").is_none());
}

#[test]
fn track_request_computes_expected_cost() {
    let tracker = CostTracker::new();
    let cost = tracker.track_request("openai", "gpt-3.5-turbo", 1_000_000, 1_000_000);
    assert!((cost - 2.0).abs() < 1e-9);
}

#[test]
fn unknown_model_is_tracked_at_zero_cost() {
    let tracker = CostTracker::new();
    let cost = tracker.track_request("openai", "mystery-model", 1000, 1000);
    assert_eq!(cost, 0.0);
    assert_eq!(tracker.entry_count(), 1);
}

#[test]
fn total_cost_is_additive_across_providers_and_models() {
    let tracker = CostTracker::new();
    tracker.track_request("openai", "gpt-4o", 1_000_000, 0);
    tracker.track_request("anthropic", "claude-3-haiku", 1_000_000, 0);

    let total = tracker.total_cost();
    let by_provider: f64 = tracker.cost_by_provider().values().sum();
    let by_model: f64 = tracker.cost_by_model().values().sum();

    assert!((total - by_provider).abs() < 1e-9);
    assert!((total - by_model).abs() < 1e-9);
    assert_eq!(tracker.entry_count(), 2);
}
