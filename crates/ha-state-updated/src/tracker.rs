//! Change detection for one watched entity
//!
//! [`ChangeTracker`] receives `(new_value, old_value)` observations, latches
//! when a genuine change is seen and unlatches once the configured window has
//! elapsed or on an explicit reset. It never persists anything itself; callers
//! save [`ChangeTracker::snapshot`] after every mutating call.
//!
//! ```text
//!   Idle ──observe (differs)──▶ Latched ──auto clear / reset──▶ Idle
//!                                 ▲  │
//!                                 └──┘ observe (differs): refresh values
//! ```

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::template::{TemplateError, TemplateVariables, TextTemplate};
use crate::value::TrackedValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserveOutcome {
    Changed,
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearOutcome {
    Cleared,
    NoOp,
}

/// Persisted tracker state, stored under the entry option keys
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub new_value: TrackedValue,
    #[serde(default)]
    pub old_value: TrackedValue,
    #[serde(default)]
    pub updated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

/// A template failure seen for the first time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateFailure {
    pub template: String,
    pub error: TemplateError,
}

/// What the tracker watches and how it reports changes
#[derive(Debug)]
pub struct TrackerSettings {
    pub entity_id: String,
    pub attribute: Option<String>,
    pub clear_after: Duration,
    pub template: TextTemplate,
}

#[derive(Debug)]
pub struct ChangeTracker {
    settings: TrackerSettings,
    current_value: TrackedValue,
    previous_value: TrackedValue,
    is_latched: bool,
    latched_at: Option<DateTime<Utc>>,
    unit_suffix: String,
    text: String,
    reported: HashSet<(String, String)>,
    failures: Vec<TemplateFailure>,
}

impl ChangeTracker {
    pub fn new(settings: TrackerSettings) -> Self {
        Self {
            settings,
            current_value: TrackedValue::unset(),
            previous_value: TrackedValue::unset(),
            is_latched: false,
            latched_at: None,
            unit_suffix: String::new(),
            text: String::new(),
            reported: HashSet::new(),
            failures: Vec::new(),
        }
    }

    /// Rebuild a tracker from a persisted snapshot
    pub fn from_snapshot(settings: TrackerSettings, snapshot: &Snapshot, unit_suffix: String) -> Self {
        let mut tracker = Self::new(settings);
        tracker.current_value = snapshot.new_value.clone();
        tracker.previous_value = snapshot.old_value.clone();
        tracker.latched_at = snapshot.last_updated;
        // A latch without a timestamp cannot expire; treat it as cleared
        tracker.is_latched = snapshot.updated && snapshot.last_updated.is_some();
        tracker.unit_suffix = unit_suffix;
        tracker.refresh_text();
        tracker
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            new_value: self.current_value.clone(),
            old_value: self.previous_value.clone(),
            updated: self.is_latched,
            last_updated: self.latched_at,
        }
    }

    /// Record an observation made at `now`
    pub fn observe_at(
        &mut self,
        new_value: TrackedValue,
        old_value: TrackedValue,
        now: DateTime<Utc>,
    ) -> ObserveOutcome {
        if new_value.is_sentinel() || new_value.is_unset() {
            debug!(entity_id = %self.settings.entity_id, "Ignoring observation without a value");
            return ObserveOutcome::Unchanged;
        }

        if old_value.is_sentinel() {
            // Recovering from missing data: compare against what we stored
            if self.current_value.is_unset() {
                // Nothing observed yet: the first reading is the baseline
                if self.previous_value.is_unset() {
                    self.previous_value = new_value.clone();
                }
                self.current_value = new_value;
            } else if self.current_value != new_value {
                self.previous_value = std::mem::replace(&mut self.current_value, new_value);
            } else {
                return ObserveOutcome::Unchanged;
            }
        } else if new_value == old_value {
            return ObserveOutcome::Unchanged;
        } else {
            self.previous_value = old_value;
            self.current_value = new_value;
        }

        if self.current_value == self.previous_value {
            return ObserveOutcome::Unchanged;
        }

        self.is_latched = true;
        self.latched_at = Some(now);
        self.refresh_text();
        debug!(
            entity_id = %self.settings.entity_id,
            new_value = %self.current_value,
            old_value = %self.previous_value,
            "Change latched"
        );
        ObserveOutcome::Changed
    }

    /// Unlatch when the clear window has elapsed
    pub fn maybe_auto_clear(&mut self, now: DateTime<Utc>) -> ClearOutcome {
        match self.latched_at {
            Some(latched_at) if self.is_latched && now >= latched_at + self.settings.clear_after => {
                debug!(entity_id = %self.settings.entity_id, "Clear window elapsed");
                self.unlatch();
                ClearOutcome::Cleared
            }
            _ => ClearOutcome::NoOp,
        }
    }

    /// Unlatch regardless of the clear window
    pub fn reset(&mut self) {
        self.unlatch();
    }

    fn unlatch(&mut self) {
        self.is_latched = false;
        self.text.clear();
    }

    /// Update the unit suffix used for display text
    /// Returns whether the suffix changed
    pub fn set_unit_suffix(&mut self, unit_suffix: String) -> bool {
        if self.unit_suffix == unit_suffix {
            return false;
        }
        self.unit_suffix = unit_suffix;
        self.refresh_text();
        true
    }

    fn refresh_text(&mut self) {
        self.text = match (self.is_latched, self.latched_at) {
            (true, Some(latched_at)) => {
                let variables = self.template_variables(latched_at);
                match self.settings.template.render(&variables) {
                    Ok(text) => text,
                    Err(err) => {
                        self.record_failure(err);
                        String::new()
                    }
                }
            }
            _ => String::new(),
        };
    }

    fn record_failure(&mut self, err: TemplateError) {
        let template = self.settings.template.source().to_string();
        if self.reported.insert((template.clone(), err.to_string())) {
            error!(
                entity_id = %self.settings.entity_id,
                template = %template,
                error = %err,
                "Error rendering text template"
            );
            self.failures.push(TemplateFailure {
                template,
                error: err,
            });
        } else {
            debug!(entity_id = %self.settings.entity_id, error = %err, "Template still failing");
        }
    }

    fn template_variables(&self, latched_at: DateTime<Utc>) -> TemplateVariables {
        let value = self.current_value.as_json().clone();
        let value_json = match &value {
            serde_json::Value::String(s) => serde_json::from_str(s).ok(),
            other => Some(other.clone()),
        };

        TemplateVariables {
            entity_id: self.settings.entity_id.clone(),
            attribute: self.settings.attribute.clone().unwrap_or_default(),
            new_value: format!("{}{}", self.current_value, self.unit_suffix),
            old_value: format!("{}{}", self.previous_value, self.unit_suffix),
            last_updated: latched_at.to_rfc3339(),
            value,
            value_json,
        }
    }

    /// Template failures not yet handed out
    pub fn take_failures(&mut self) -> Vec<TemplateFailure> {
        std::mem::take(&mut self.failures)
    }

    pub fn current_value(&self) -> &TrackedValue {
        &self.current_value
    }

    pub fn previous_value(&self) -> &TrackedValue {
        &self.previous_value
    }

    pub fn is_latched(&self) -> bool {
        self.is_latched
    }

    pub fn latched_at(&self) -> Option<DateTime<Utc>> {
        self.latched_at
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn settings(template: &str) -> TrackerSettings {
        TrackerSettings {
            entity_id: "sensor.temperature".to_string(),
            attribute: None,
            clear_after: Duration::hours(1),
            template: TextTemplate::new(template),
        }
    }

    fn tracker() -> ChangeTracker {
        ChangeTracker::new(settings("Changed from {{ old_value }} to {{ new_value }}"))
    }

    fn v(s: &str) -> TrackedValue {
        TrackedValue::from(s)
    }

    #[test]
    fn test_differing_values_latch() {
        let mut tracker = tracker();

        assert_eq!(tracker.observe_at(v("10"), v("5"), t0()), ObserveOutcome::Changed);
        assert_eq!(tracker.current_value(), &v("10"));
        assert_eq!(tracker.previous_value(), &v("5"));
        assert!(tracker.is_latched());
        assert_eq!(tracker.latched_at(), Some(t0()));
        assert_eq!(tracker.text(), "Changed from 5 to 10");
    }

    #[test]
    fn test_equal_values_do_not_mutate() {
        let mut tracker = tracker();
        tracker.observe_at(v("10"), v("5"), t0());
        let before = tracker.snapshot();

        let later = t0() + Duration::minutes(5);
        assert_eq!(tracker.observe_at(v("7"), v("7"), later), ObserveOutcome::Unchanged);
        assert_eq!(tracker.snapshot(), before);
    }

    #[test]
    fn test_integer_and_float_of_same_number_do_not_latch() {
        let mut tracker = tracker();
        let three = TrackedValue::from_json(Some(&json!(3))).unwrap();
        let three_float = TrackedValue::from_json(Some(&json!(3.0))).unwrap();

        assert_eq!(
            tracker.observe_at(three_float, three, t0()),
            ObserveOutcome::Unchanged
        );
        assert!(!tracker.is_latched());
    }

    #[test]
    fn test_sentinel_new_value_is_ignored() {
        let mut tracker = tracker();
        assert_eq!(
            tracker.observe_at(v("unavailable"), v("5"), t0()),
            ObserveOutcome::Unchanged
        );
        assert_eq!(tracker.observe_at(v(""), v("5"), t0()), ObserveOutcome::Unchanged);
        assert!(tracker.current_value().is_unset());
        assert!(!tracker.is_latched());
    }

    #[test]
    fn test_recovery_promotes_stored_value() {
        let mut tracker = tracker();
        tracker.observe_at(v("10"), v("5"), t0());
        tracker.reset();

        let later = t0() + Duration::minutes(10);
        assert_eq!(tracker.observe_at(v("12"), v("unknown"), later), ObserveOutcome::Changed);
        assert_eq!(tracker.current_value(), &v("12"));
        assert_eq!(tracker.previous_value(), &v("10"));
        assert_eq!(tracker.latched_at(), Some(later));
    }

    #[test]
    fn test_recovery_with_same_value_is_noop() {
        let mut tracker = tracker();
        tracker.observe_at(v("10"), v("5"), t0());
        tracker.reset();
        let before = tracker.snapshot();

        assert_eq!(
            tracker.observe_at(v("10"), v("unavailable"), t0() + Duration::minutes(1)),
            ObserveOutcome::Unchanged
        );
        assert_eq!(tracker.snapshot(), before);
    }

    #[test]
    fn test_recovery_into_empty_current() {
        let snapshot = Snapshot {
            new_value: TrackedValue::unset(),
            old_value: v("8"),
            updated: false,
            last_updated: None,
        };
        let mut tracker = ChangeTracker::from_snapshot(settings(""), &snapshot, String::new());

        assert_eq!(tracker.observe_at(v("8"), v("unknown"), t0()), ObserveOutcome::Unchanged);
        assert_eq!(tracker.current_value(), &v("8"));
        assert_eq!(tracker.previous_value(), &v("8"));
        assert!(!tracker.is_latched());
    }

    #[test]
    fn test_first_reading_after_unknown_is_baseline() {
        let mut tracker = tracker();

        assert_eq!(tracker.observe_at(v("3"), v("unknown"), t0()), ObserveOutcome::Unchanged);
        assert_eq!(tracker.current_value(), &v("3"));
        assert_eq!(tracker.previous_value(), &v("3"));

        assert_eq!(tracker.observe_at(v("4"), v("3"), t0()), ObserveOutcome::Changed);
    }

    #[test]
    fn test_auto_clear_window() {
        let mut tracker = tracker();
        tracker.observe_at(v("10"), v("5"), t0());

        assert_eq!(
            tracker.maybe_auto_clear(t0() + Duration::minutes(30)),
            ClearOutcome::NoOp
        );
        assert!(tracker.is_latched());

        assert_eq!(
            tracker.maybe_auto_clear(t0() + Duration::minutes(61)),
            ClearOutcome::Cleared
        );
        assert!(!tracker.is_latched());
        assert_eq!(tracker.text(), "");

        assert_eq!(
            tracker.maybe_auto_clear(t0() + Duration::minutes(62)),
            ClearOutcome::NoOp
        );
    }

    #[test]
    fn test_auto_clear_at_exact_boundary() {
        let mut tracker = tracker();
        tracker.observe_at(v("10"), v("5"), t0());
        assert_eq!(tracker.maybe_auto_clear(t0() + Duration::hours(1)), ClearOutcome::Cleared);
    }

    #[test]
    fn test_relatch_refreshes_timestamp() {
        let mut tracker = tracker();
        tracker.observe_at(v("10"), v("5"), t0());

        let later = t0() + Duration::minutes(50);
        assert_eq!(tracker.observe_at(v("11"), v("10"), later), ObserveOutcome::Changed);
        assert_eq!(tracker.maybe_auto_clear(t0() + Duration::minutes(61)), ClearOutcome::NoOp);
        assert_eq!(tracker.latched_at(), Some(later));
    }

    #[test]
    fn test_reset_ignores_window() {
        let mut tracker = tracker();
        tracker.observe_at(v("10"), v("5"), t0());

        tracker.reset();
        assert!(!tracker.is_latched());
        assert_eq!(tracker.text(), "");
        assert_eq!(tracker.maybe_auto_clear(t0() + Duration::days(3)), ClearOutcome::NoOp);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut tracker = tracker();
        tracker.observe_at(v("10"), v("5"), t0());

        let json = serde_json::to_value(tracker.snapshot()).unwrap();
        assert_eq!(json["new_value"], json!("10"));
        assert_eq!(json["updated"], json!(true));

        let snapshot: Snapshot = serde_json::from_value(json).unwrap();
        let restored = ChangeTracker::from_snapshot(
            settings("Changed from {{ old_value }} to {{ new_value }}"),
            &snapshot,
            String::new(),
        );
        assert_eq!(restored.current_value(), tracker.current_value());
        assert_eq!(restored.previous_value(), tracker.previous_value());
        assert_eq!(restored.is_latched(), tracker.is_latched());
        assert_eq!(restored.latched_at(), tracker.latched_at());
        assert_eq!(restored.text(), tracker.text());
    }

    #[test]
    fn test_unit_suffix_in_text() {
        let mut tracker = tracker();
        assert!(tracker.set_unit_suffix("%".to_string()));
        tracker.observe_at(v("40"), v("35"), t0());
        assert_eq!(tracker.text(), "Changed from 35% to 40%");

        assert!(!tracker.set_unit_suffix("%".to_string()));
        assert!(tracker.set_unit_suffix(" W".to_string()));
        assert_eq!(tracker.text(), "Changed from 35 W to 40 W");
    }

    #[test]
    fn test_last_updated_variable() {
        let mut tracker = ChangeTracker::new(settings("{{ last_updated }}"));
        tracker.observe_at(v("on"), v("off"), t0());
        assert_eq!(tracker.text(), t0().to_rfc3339());
    }

    #[test]
    fn test_template_failure_reported_once() {
        let mut tracker = ChangeTracker::new(settings("{{ new_value "));

        tracker.observe_at(v("1"), v("0"), t0());
        tracker.observe_at(v("2"), v("1"), t0());
        assert_eq!(tracker.text(), "");
        assert!(tracker.is_latched());

        let failures = tracker.take_failures();
        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0].error, TemplateError::Syntax(_)));

        tracker.observe_at(v("3"), v("2"), t0());
        assert!(tracker.take_failures().is_empty());
    }
}
