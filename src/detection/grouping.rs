//! Partition a batch of entries by session id.
//!
//! Groups are kept in first-seen order and entries within a group keep batch
//! order. A grouping is built fresh for each evaluation and borrows from the
//! batch; nothing is cached between evaluations.

use std::collections::HashMap;

use crate::telemetry::TelemetryEntry;

/// Session id → entries of that session, in insertion order.
#[derive(Debug, Default)]
pub struct SessionGroups<'a> {
    groups: Vec<(&'a str, Vec<&'a TelemetryEntry>)>,
    index: HashMap<&'a str, usize>,
}

impl<'a> SessionGroups<'a> {
    fn push(&mut self, entry: &'a TelemetryEntry) {
        let sid = entry.session();
        match self.index.get(sid) {
            Some(&i) => self.groups[i].1.push(entry),
            None => {
                self.index.insert(sid, self.groups.len());
                self.groups.push((sid, vec![entry]));
            }
        }
    }

    /// Number of distinct sessions.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Entries of one session, if it appears in the batch.
    pub fn get(&self, session: &str) -> Option<&[&'a TelemetryEntry]> {
        self.index.get(session).map(|&i| self.groups[i].1.as_slice())
    }

    /// Iterate `(session_id, entries)` in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &[&'a TelemetryEntry])> + '_ {
        self.groups.iter().map(|(sid, entries)| (*sid, entries.as_slice()))
    }

    /// Session ids in first-seen order.
    pub fn session_ids(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.groups.iter().map(|(sid, _)| *sid)
    }
}

/// Group `entries` by [`TelemetryEntry::session`].
pub fn group_by_session<'a, I>(entries: I) -> SessionGroups<'a>
where
    I: IntoIterator<Item = &'a TelemetryEntry>,
{
    let mut groups = SessionGroups::default();
    for entry in entries {
        groups.push(entry);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::UNKNOWN_SESSION;
    use chrono::Utc;

    fn entry(sid: Option<&str>, br: f64) -> TelemetryEntry {
        let mut e = TelemetryEntry::new(Utc::now(), sid.map(str::to_string));
        e.bitrate_kbps = Some(br);
        e
    }

    #[test]
    fn test_empty_batch() {
        let batch: Vec<TelemetryEntry> = Vec::new();
        let g = group_by_session(&batch);
        assert!(g.is_empty());
        assert_eq!(g.len(), 0);
    }

    #[test]
    fn test_first_seen_order_and_entry_order() {
        let batch = vec![
            entry(Some("b"), 1.0),
            entry(Some("a"), 2.0),
            entry(Some("b"), 3.0),
            entry(Some("c"), 4.0),
            entry(Some("a"), 5.0),
        ];
        let g = group_by_session(&batch);
        let ids: Vec<&str> = g.session_ids().collect();
        assert_eq!(ids, vec!["b", "a", "c"]);

        let b: Vec<f64> = g.get("b").unwrap().iter().filter_map(|e| e.bitrate_kbps).collect();
        assert_eq!(b, vec![1.0, 3.0]);
        let a: Vec<f64> = g.get("a").unwrap().iter().filter_map(|e| e.bitrate_kbps).collect();
        assert_eq!(a, vec![2.0, 5.0]);
    }

    #[test]
    fn test_missing_sid_grouped_as_unknown() {
        let batch = vec![entry(None, 1.0), entry(Some(""), 2.0), entry(Some("x"), 3.0)];
        let g = group_by_session(&batch);
        assert_eq!(g.get(UNKNOWN_SESSION).map(|v| v.len()), Some(2));
        assert_eq!(g.len(), 2);
    }

    #[test]
    fn test_group_filtered_subset() {
        let mut starving = entry(Some("s"), 1.0);
        starving.buffer_starvation = Some(true);
        let batch = vec![entry(Some("s"), 1.0), starving, entry(Some("t"), 1.0)];
        let g = group_by_session(batch.iter().filter(|e| e.is_starved()));
        assert_eq!(g.len(), 1);
        assert_eq!(g.get("s").map(|v| v.len()), Some(1));
        assert!(g.get("t").is_none());
    }
}
