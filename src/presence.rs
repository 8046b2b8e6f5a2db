//! Person presence tracking.
//!
//! Turns the per-cycle detection stream into enter/exit edges. The tracker
//! keeps a single bit of state and never exposes it; consumers only see
//! `PresenceEvent`s.

use crate::detect::DetectionSet;

pub const DEFAULT_PERSON_CLASS: &str = "person";

/// Edge emitted when the person-present classification flips.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PresenceEvent {
    /// A person appeared. `other_classes` lists the accompanying labels,
    /// deduplicated in first-seen order.
    Enter { other_classes: Vec<String> },
    /// No person is visible any more.
    Exit,
}

pub struct PresenceTracker {
    person_class: String,
    present: bool,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::with_person_class(DEFAULT_PERSON_CLASS)
    }

    pub fn with_person_class(person_class: impl Into<String>) -> Self {
        Self {
            person_class: person_class.into(),
            present: false,
        }
    }

    /// Feed one cycle's detections.
    pub fn observe(&mut self, set: &DetectionSet) -> Option<PresenceEvent> {
        let (next, event) = transition(self.present, set, &self.person_class);
        self.present = next;
        event
    }

    /// Force an exit edge if a person is currently considered present.
    ///
    /// Used when detection has been failing for longer than the configured
    /// tolerance; returns `None` when already absent.
    pub fn force_exit(&mut self) -> Option<PresenceEvent> {
        if self.present {
            self.present = false;
            Some(PresenceEvent::Exit)
        } else {
            None
        }
    }
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Pure transition: `(was_present, detections) -> (is_present, edge)`.
pub fn transition(
    was_present: bool,
    set: &DetectionSet,
    person_class: &str,
) -> (bool, Option<PresenceEvent>) {
    let present = set.contains_class(person_class);
    match (was_present, present) {
        (false, true) => (
            true,
            Some(PresenceEvent::Enter {
                other_classes: set.classes_except(person_class),
            }),
        ),
        (true, false) => (false, Some(PresenceEvent::Exit)),
        (state, _) => (state, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, DetectedObject};

    fn set(classes: &[&str]) -> DetectionSet {
        DetectionSet::new(
            classes
                .iter()
                .map(|c| DetectedObject::new(*c, 0.7, BoundingBox::new(1.0, 1.0, 5.0, 5.0)))
                .collect(),
        )
    }

    #[test]
    fn transition_table() {
        let (next, ev) = transition(false, &set(&["person", "dog"]), "person");
        assert!(next);
        assert_eq!(
            ev,
            Some(PresenceEvent::Enter {
                other_classes: vec!["dog".to_string()]
            })
        );

        assert_eq!(transition(true, &set(&["person"]), "person"), (true, None));
        assert_eq!(
            transition(true, &set(&["dog"]), "person"),
            (false, Some(PresenceEvent::Exit))
        );
        assert_eq!(transition(false, &set(&[]), "person"), (false, None));
    }

    #[test]
    fn person_anywhere_in_set_counts_as_present() {
        for classes in [
            vec!["person"],
            vec!["dog", "person"],
            vec!["chair", "cup", "person", "person"],
        ] {
            let (present, _) = transition(false, &set(&classes), "person");
            assert!(present, "expected present for {:?}", classes);
        }
    }

    #[test]
    fn scenario_produces_enter_then_exit() {
        let mut tracker = PresenceTracker::new();
        let events: Vec<_> = [
            set(&[]),
            set(&["person"]),
            set(&["person", "dog"]),
            set(&[]),
        ]
        .iter()
        .map(|s| tracker.observe(s))
        .collect();

        assert_eq!(
            events,
            vec![
                None,
                Some(PresenceEvent::Enter {
                    other_classes: vec![]
                }),
                None,
                Some(PresenceEvent::Exit),
            ]
        );
    }

    #[test]
    fn custom_person_class() {
        let mut tracker = PresenceTracker::with_person_class("human");
        assert_eq!(tracker.observe(&set(&["person"])), None);
        assert!(matches!(
            tracker.observe(&set(&["human", "person"])),
            Some(PresenceEvent::Enter { other_classes }) if other_classes == vec!["person".to_string()]
        ));
    }

    #[test]
    fn force_exit_only_when_present() {
        let mut tracker = PresenceTracker::new();
        assert_eq!(tracker.force_exit(), None);
        tracker.observe(&set(&["person"]));
        assert_eq!(tracker.force_exit(), Some(PresenceEvent::Exit));
        assert_eq!(tracker.force_exit(), None);
    }
}
