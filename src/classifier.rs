//! Relevance gates applied before an alert is processed: region match and
//! drill detection.
//!
//! The feed has no structured "drill" flag. Drills are published as regular
//! alerts whose locality list carries a marker such as "בדיקה" (test) or
//! "בדיקה מחזורית" (periodic test), so detection is textual containment.

use std::fmt;

use crate::feed::AlertEvent;
use crate::taxonomy::normalize;

/// Containment on "בדיקה" also covers "בדיקה מחזורית".
pub const DRILL_MARKERS: &[&str] = &["בדיקה"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Region {
    All,
    /// A single locality, stored normalized.
    Exact(String),
}

impl Region {
    /// `*` (or an empty value) means every region.
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "" | "*" => Self::All,
            name => Self::Exact(normalize(name)),
        }
    }

    /// True when the alert lists this region among its localities.
    pub fn matches(&self, event: &AlertEvent) -> bool {
        match self {
            Self::All => true,
            Self::Exact(name) => event.data.iter().any(|l| normalize(l) == *name),
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("*"),
            Self::Exact(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Classifier {
    pub region: Region,
    /// When `false`, drills are filtered out; when `true` every alert is real.
    pub include_test_alerts: bool,
}

impl Classifier {
    pub fn new(region: Region, include_test_alerts: bool) -> Self {
        Self {
            region,
            include_test_alerts,
        }
    }

    pub fn in_region(&self, event: &AlertEvent) -> bool {
        self.region.matches(event)
    }

    pub fn is_test(&self, event: &AlertEvent) -> bool {
        !self.include_test_alerts
            && event
                .data
                .iter()
                .any(|l| DRILL_MARKERS.iter().any(|m| l.contains(m)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(data: &[&str]) -> AlertEvent {
        AlertEvent {
            id: "1".into(),
            title: "ירי רקטות וטילים".into(),
            data: data.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn drill_filtered_only_when_toggle_excludes_tests() {
        let drill = event(&["בדיקה"]);
        assert!(Classifier::new(Region::All, false).is_test(&drill));
        assert!(!Classifier::new(Region::All, true).is_test(&drill));
    }

    #[test]
    fn periodic_drill_marker_is_detected() {
        let drill = event(&["שדרות", "בדיקה מחזורית"]);
        assert!(Classifier::new(Region::All, false).is_test(&drill));
    }

    #[test]
    fn real_alert_is_never_a_test() {
        let real = event(&["שדרות", "אשקלון - דרום"]);
        assert!(!Classifier::new(Region::All, false).is_test(&real));
        assert!(!Classifier::new(Region::All, true).is_test(&real));
    }

    #[test]
    fn wildcard_region_matches_everything() {
        assert_eq!(Region::parse("*"), Region::All);
        assert_eq!(Region::parse("  "), Region::All);
        assert!(Region::All.matches(&event(&[])));
    }

    #[test]
    fn exact_region_requires_listed_locality() {
        let region = Region::parse(" Town A ");
        assert!(region.matches(&event(&["Town B", "Town A"])));
        assert!(!region.matches(&event(&["Town B"])));
        assert!(!region.matches(&event(&["Town A North"])), "whole-name match only");
    }

    #[test]
    fn exact_region_ignores_apostrophe_variant() {
        let region = Region::parse("ג'סר א-זרקא");
        assert!(region.matches(&event(&["ג׳סר א-זרקא"])));
    }
}
