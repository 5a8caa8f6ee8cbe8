//! Consecutive-failure tracking per periodic component.

use std::collections::HashMap;

use crate::notification::HealthData;

/// What a recorded outcome changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthChange {
    /// Nothing worth telling the operator.
    Unchanged,
    /// The first failure after a healthy run.
    FirstFailure,
    /// The component just crossed into the degraded state.
    Degraded(HealthData),
    /// A degraded component succeeded again.
    Recovered(HealthData),
}

#[derive(Debug, Default)]
struct ComponentHealth {
    consecutive_failures: u32,
    degraded: bool,
    last_error: Option<String>,
}

/// Escalates repeated failures into a single degraded notice per outage.
#[derive(Debug)]
pub struct HealthTracker {
    threshold: u32,
    components: HashMap<String, ComponentHealth>,
}

impl HealthTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            components: HashMap::new(),
        }
    }

    /// Records a failed run. `fatal` failures (rejected credentials) degrade
    /// the component at once.
    pub fn record_failure(&mut self, component: &str, error: &str, fatal: bool) -> HealthChange {
        let threshold = self.threshold;
        let health = self.components.entry(component.to_string()).or_default();
        health.consecutive_failures += 1;
        health.last_error = Some(error.to_string());

        if !health.degraded && (fatal || health.consecutive_failures >= threshold) {
            health.degraded = true;
            return HealthChange::Degraded(HealthData {
                component: component.to_string(),
                degraded: true,
                consecutive_failures: health.consecutive_failures,
                last_error: health.last_error.clone(),
            });
        }

        if health.consecutive_failures == 1 {
            HealthChange::FirstFailure
        } else {
            HealthChange::Unchanged
        }
    }

    /// Records a successful run.
    pub fn record_success(&mut self, component: &str) -> HealthChange {
        let Some(health) = self.components.get_mut(component) else {
            return HealthChange::Unchanged;
        };

        let was_degraded = health.degraded;
        *health = ComponentHealth::default();

        if was_degraded {
            HealthChange::Recovered(HealthData {
                component: component.to_string(),
                degraded: false,
                consecutive_failures: 0,
                last_error: None,
            })
        } else {
            HealthChange::Unchanged
        }
    }

    /// Names of the currently degraded components, sorted.
    pub fn degraded_components(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .components
            .iter()
            .filter(|(_, h)| h.degraded)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degrades_once_at_threshold() {
        let mut health = HealthTracker::new(3);

        assert_eq!(health.record_failure("feed", "timeout", false), HealthChange::FirstFailure);
        assert_eq!(health.record_failure("feed", "timeout", false), HealthChange::Unchanged);
        assert!(matches!(
            health.record_failure("feed", "timeout", false),
            HealthChange::Degraded(HealthData { consecutive_failures: 3, .. })
        ));
        assert_eq!(health.record_failure("feed", "timeout", false), HealthChange::Unchanged);
        assert_eq!(health.degraded_components(), vec!["feed".to_string()]);
    }

    #[test]
    fn test_fatal_failure_degrades_immediately() {
        let mut health = HealthTracker::new(5);
        assert!(matches!(
            health.record_failure("monitor", "invalid api key", true),
            HealthChange::Degraded(_)
        ));
    }

    #[test]
    fn test_recovery_after_degradation() {
        let mut health = HealthTracker::new(1);
        health.record_failure("feed", "timeout", false);

        match health.record_success("feed") {
            HealthChange::Recovered(data) => {
                assert!(!data.degraded);
                assert_eq!(data.component, "feed");
            }
            other => panic!("expected recovery, got {:?}", other),
        }
        assert!(health.degraded_components().is_empty());
        assert_eq!(health.record_success("feed"), HealthChange::Unchanged);
    }

    #[test]
    fn test_success_resets_streak_without_notice() {
        let mut health = HealthTracker::new(3);
        health.record_failure("feed", "timeout", false);
        health.record_failure("feed", "timeout", false);

        assert_eq!(health.record_success("feed"), HealthChange::Unchanged);
        assert_eq!(health.record_failure("feed", "timeout", false), HealthChange::FirstFailure);
    }

    #[test]
    fn test_components_are_independent() {
        let mut health = HealthTracker::new(1);
        health.record_failure("monitor", "timeout", false);
        health.record_success("monitor");
        health.record_failure("feed", "timeout", false);
        assert_eq!(health.degraded_components(), vec!["feed".to_string()]);
    }
}
