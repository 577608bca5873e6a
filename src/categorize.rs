//! Grouping of an alert's localities by taxonomy area, and message rendering.

use std::collections::HashSet;

use tracing::warn;

use crate::feed::AlertEvent;
use crate::taxonomy::{Taxonomy, normalize};

/// Lead line of every dispatched message ("in the following areas:").
pub const AREAS_LEAD: &str = "באזורים הבאים:";
const LINE_BREAK: &str = "\r\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AreaGroup {
    pub area: String,
    pub localities: Vec<String>,
}

/// Areas in first-encounter order, each with its localities in
/// first-encounter order. Unmatched localities are kept aside for reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategorizedResult {
    pub groups: Vec<AreaGroup>,
    pub unmatched: Vec<String>,
}

impl CategorizedResult {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    #[cfg(test)]
    pub fn area(&self, name: &str) -> Option<&AreaGroup> {
        self.groups.iter().find(|g| g.area == name)
    }

    fn push(&mut self, area: &str, locality: String) {
        match self.groups.iter_mut().find(|g| g.area == area) {
            Some(group) => group.localities.push(locality),
            None => self.groups.push(AreaGroup {
                area: area.to_owned(),
                localities: vec![locality],
            }),
        }
    }
}

/// Assign each locality to the first taxonomy area listing it. A locality
/// repeated within one alert is kept once. Localities no area knows are
/// logged and returned in `unmatched`.
pub fn categorize(taxonomy: &Taxonomy, localities: &[String]) -> CategorizedResult {
    let mut result = CategorizedResult::default();
    let mut placed: HashSet<String> = HashSet::new();

    for raw in localities {
        let key = normalize(raw);
        if key.is_empty() || !placed.insert(key.clone()) {
            continue;
        }
        match taxonomy.area_of(&key) {
            Some(area) => result.push(area, raw.trim().to_owned()),
            None => {
                warn!("Locality {raw:?} matches no taxonomy area");
                result.unmatched.push(raw.trim().to_owned());
            }
        }
    }

    result
}

/// One `*ישובי <area>*:` heading per area, followed by its localities,
/// one per line.
pub fn format(result: &CategorizedResult) -> String {
    let mut lines = Vec::new();
    for group in &result.groups {
        lines.push(format!("*ישובי {}*:", group.area));
        lines.extend(group.localities.iter().cloned());
    }
    lines.join(LINE_BREAK)
}

/// Full outbound text for one alert. When nothing could be grouped, the raw
/// locality names are listed instead so the notice is never blank.
pub fn compose_message(event: &AlertEvent, result: &CategorizedResult) -> String {
    let mut out = String::new();
    if !event.title.trim().is_empty() {
        out.push_str(&format!("*{}*{LINE_BREAK}", event.title.trim()));
    }
    out.push_str(AREAS_LEAD);
    out.push_str(LINE_BREAK);
    if result.is_empty() {
        out.push_str(&result.unmatched.join(", "));
    } else {
        out.push_str(&format(result));
    }
    out
}
