use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    InProgress,
    Completed,
    Failed,
}

impl DownloadState {
    pub fn tag(&self) -> &'static str {
        match self {
            DownloadState::InProgress => "[D]",
            DownloadState::Completed => "[C]",
            DownloadState::Failed => "[F]",
        }
    }
}

/// Session-scoped download states, keyed by (group, file) and rendered by
/// `show_downloads`.
pub struct DownloadBoard {
    entries: Mutex<BTreeMap<(String, String), DownloadState>>,
}

impl DownloadBoard {
    pub fn new() -> DownloadBoard {
        DownloadBoard {
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn set(&self, group: &str, file: &str, state: DownloadState) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert((group.to_string(), file.to_string()), state);
    }

    pub fn is_in_progress(&self, group: &str, file: &str) -> bool {
        let entries = self.entries.lock().unwrap();
        entries.get(&(group.to_string(), file.to_string()))
            == Some(&DownloadState::InProgress)
    }

    pub fn snapshot(&self) -> Vec<((String, String), DownloadState)> {
        let entries = self.entries.lock().unwrap();
        entries.iter().map(|(k, v)| (k.clone(), *v)).collect()
    }
}

impl Default for DownloadBoard {
    fn default() -> Self {
        DownloadBoard::new()
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_states_progress() {
        let board = DownloadBoard::new();
        board.set("dev", "notes.txt", DownloadState::InProgress);
        assert!(board.is_in_progress("dev", "notes.txt"));

        board.set("dev", "notes.txt", DownloadState::Completed);
        assert!(!board.is_in_progress("dev", "notes.txt"));
        assert_eq!(
            board.snapshot(),
            vec![(("dev".to_string(), "notes.txt".to_string()), DownloadState::Completed)]
        );
    }

    #[test]
    fn test_snapshot_is_sorted_by_group_then_file() {
        let board = DownloadBoard::new();
        board.set("dev", "b.txt", DownloadState::Failed);
        board.set("art", "z.txt", DownloadState::InProgress);
        board.set("dev", "a.txt", DownloadState::Completed);

        let keys: Vec<String> = board
            .snapshot()
            .into_iter()
            .map(|((g, f), _)| format!("{g}/{f}"))
            .collect();
        assert_eq!(keys, vec!["art/z.txt", "dev/a.txt", "dev/b.txt"]);
    }
}
