//! Recent sync activity, kept in a fixed-capacity ring.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// How many activity entries are retained.
pub const ACTIVITY_CAPACITY: usize = 100;

/// What happened to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    /// A local change was sent to peers.
    Sent,
    /// A remote change was applied locally.
    Received,
    /// A file was deleted, locally or on request of a peer.
    Deleted,
}

impl std::fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Sent => "sent",
            Self::Received => "received",
            Self::Deleted => "deleted",
        })
    }
}

/// One sync operation, for display.
#[derive(Debug, Clone)]
pub struct Activity {
    /// What happened.
    pub kind: ActivityKind,
    /// The file's base name.
    pub file_name: String,
    /// The local folder involved.
    pub folder_path: String,
    /// Path relative to the folder root.
    pub rel_path: String,
    /// The peer involved, or `"all"` for broadcasts.
    pub peer_name: String,
    /// When it happened.
    pub timestamp: DateTime<Utc>,
}

/// Fixed-capacity ring of recent activities, newest first.
#[derive(Debug, Default)]
pub struct ActivityLog {
    entries: Mutex<VecDeque<Activity>>,
}

impl ActivityLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one activity, evicting the oldest past capacity.
    pub fn record(&self, activity: Activity) {
        let mut entries = self.entries.lock();
        entries.push_front(activity);
        entries.truncate(ACTIVITY_CAPACITY);
    }

    /// The most recent activities, newest first. `limit` 0 means all.
    pub fn recent(&self, limit: usize) -> Vec<Activity> {
        let entries = self.entries.lock();
        let take = if limit == 0 || limit > entries.len() {
            entries.len()
        } else {
            limit
        };
        entries.iter().take(take).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activity(rel_path: &str) -> Activity {
        Activity {
            kind: ActivityKind::Sent,
            file_name: rel_path.rsplit('/').next().unwrap_or(rel_path).into(),
            folder_path: "/home/a/Shared".into(),
            rel_path: rel_path.into(),
            peer_name: "all".into(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn newest_first() {
        let log = ActivityLog::new();
        log.record(activity("first.txt"));
        log.record(activity("second.txt"));

        let recent = log.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].rel_path, "second.txt");
        assert_eq!(recent[1].rel_path, "first.txt");
    }

    #[test]
    fn capacity_is_bounded() {
        let log = ActivityLog::new();
        for i in 0..(ACTIVITY_CAPACITY + 20) {
            log.record(activity(&format!("file-{i}.txt")));
        }

        let all = log.recent(0);
        assert_eq!(all.len(), ACTIVITY_CAPACITY);
        // The oldest 20 fell off the back.
        assert_eq!(all[0].rel_path, format!("file-{}.txt", ACTIVITY_CAPACITY + 19));
        assert_eq!(all.last().unwrap().rel_path, "file-20.txt");
    }

    #[test]
    fn limit_truncates() {
        let log = ActivityLog::new();
        for i in 0..10 {
            log.record(activity(&format!("file-{i}.txt")));
        }
        assert_eq!(log.recent(3).len(), 3);
        assert_eq!(log.recent(0).len(), 10);
        assert_eq!(log.recent(50).len(), 10);
    }
}
