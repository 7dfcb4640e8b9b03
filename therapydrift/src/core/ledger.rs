//! Read model over a task's drift signal history.

use chrono::{DateTime, Utc};

use crate::core::types::SignalEvent;

/// Append-only, ordered view of the drift signals found in a task log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalLedger {
    events: Vec<SignalEvent>,
}

impl SignalLedger {
    pub fn new(events: Vec<SignalEvent>) -> Self {
        Self { events }
    }

    /// Build a ledger from `(timestamp, message)` log entries, keeping only the
    /// lines that start with one of `markers`. Log order is preserved.
    pub fn from_log<I, S>(entries: I, markers: &[String]) -> Self
    where
        I: IntoIterator<Item = (Option<DateTime<Utc>>, S)>,
        S: AsRef<str>,
    {
        let events = entries
            .into_iter()
            .filter_map(|(timestamp, message)| {
                let message = message.as_ref();
                let marker = markers.iter().find(|m| message.starts_with(m.as_str()))?;
                Some(SignalEvent {
                    timestamp,
                    source_tag: marker.clone(),
                    raw_text: message.to_string(),
                })
            })
            .collect();
        Self { events }
    }

    pub fn events(&self) -> &[SignalEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events that are not self-authored, i.e. whose tag and text match none
    /// of `ignore_prefixes`.
    pub fn filtered<'a>(&'a self, ignore_prefixes: &'a [String]) -> Vec<&'a SignalEvent> {
        self.events
            .iter()
            .filter(|event| !is_ignored(event, ignore_prefixes))
            .collect()
    }
}

fn is_ignored(event: &SignalEvent, ignore_prefixes: &[String]) -> bool {
    ignore_prefixes.iter().any(|prefix| {
        event.source_tag.starts_with(prefix.as_str()) || event.raw_text.starts_with(prefix.as_str())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markers() -> Vec<String> {
        vec!["Speedrift:".to_string(), "Therapydrift:".to_string()]
    }

    #[test]
    fn keeps_only_marker_lines_in_order() {
        let ledger = SignalLedger::from_log(
            [
                (None, "Speedrift: yellow (scope_drift)"),
                (None, "started work"),
                (None, "Therapydrift: yellow (repeated_drift_signals)"),
            ],
            &markers(),
        );
        let tags: Vec<&str> = ledger
            .events()
            .iter()
            .map(|e| e.source_tag.as_str())
            .collect();
        assert_eq!(tags, vec!["Speedrift:", "Therapydrift:"]);
    }

    #[test]
    fn filtered_drops_self_authored_signals() {
        let ledger = SignalLedger::from_log(
            [
                (None, "Speedrift: yellow"),
                (None, "Therapydrift: OK (no findings)"),
            ],
            &markers(),
        );
        let ignore = vec!["Therapydrift:".to_string()];
        let kept = ledger.filtered(&ignore);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].raw_text, "Speedrift: yellow");
    }
}
