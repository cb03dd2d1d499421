//! Subscription matching.
//!
//! Runs for every object mutation, so everything here is a plain predicate
//! over borrowed data with no allocation.

use crate::event::EventName;
use crate::subscription::{NotificationFilter, ServiceConfig};

/// Returns true if `event` is selected by any entry in `patterns`.
///
/// An entry is either an exact event name or a family pattern ending in `*`,
/// which selects every event name starting with the text before the `*`.
pub fn event_matches<S: AsRef<str>>(patterns: &[S], event: EventName) -> bool {
    let name = event.as_str();
    patterns.iter().any(|pattern| {
        let pattern = pattern.as_ref();
        match pattern.strip_suffix('*') {
            Some(family) => name.starts_with(family),
            None => pattern == name,
        }
    })
}

/// Returns true if `key` satisfies every prefix and suffix rule in `filter`.
pub fn key_matches(filter: &NotificationFilter, key: &str) -> bool {
    filter.key.filter_rules.iter().all(|rule| {
        if rule.is_prefix() {
            key.starts_with(rule.value.as_str())
        } else if rule.is_suffix() {
            key.ends_with(rule.value.as_str())
        } else {
            // Unknown rule names are rejected on validation; never match them.
            false
        }
    })
}

/// Full subscription match: event type and object key.
pub fn service_matches(config: &ServiceConfig, event: EventName, key: &str) -> bool {
    event_matches(&config.events, event) && key_matches(&config.filter, key)
}
