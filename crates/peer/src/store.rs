use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// The peer's local registry of shareable files: which on-disk path backs a
/// (file, group) pair, and which pieces of each path this peer holds.
///
/// Two mutexes, one per map, always taken in the order paths -> pieces.
/// Piece sets only grow while a session lasts; logout clears them, the path
/// registry survives so the peer can re-advertise after its next login.
pub struct PieceStore {
    paths: Mutex<HashMap<(String, String), PathBuf>>,
    pieces: Mutex<HashMap<PathBuf, BTreeSet<u32>>>,
}

impl PieceStore {
    pub fn new() -> PieceStore {
        PieceStore {
            paths: Mutex::new(HashMap::new()),
            pieces: Mutex::new(HashMap::new()),
        }
    }

    /// Bind (file, group) to an on-disk path, starting with no pieces.
    pub fn register_file(&self, file: &str, group: &str, path: &Path) {
        let mut paths = self.paths.lock().unwrap();
        let mut pieces = self.pieces.lock().unwrap();
        paths.insert((file.to_string(), group.to_string()), path.to_path_buf());
        pieces.entry(path.to_path_buf()).or_default();
    }

    pub fn add_piece(&self, path: &Path, piece: u32) {
        let mut pieces = self.pieces.lock().unwrap();
        pieces.entry(path.to_path_buf()).or_default().insert(piece);
    }

    /// Mark every piece of a complete file as held.
    pub fn add_all_pieces(&self, path: &Path, count: u32) {
        let mut pieces = self.pieces.lock().unwrap();
        let set = pieces.entry(path.to_path_buf()).or_default();
        set.extend(0..count);
    }

    pub fn file_path(&self, file: &str, group: &str) -> Option<PathBuf> {
        let paths = self.paths.lock().unwrap();
        paths.get(&(file.to_string(), group.to_string())).cloned()
    }

    /// Pieces currently held for (file, group); `None` when the pair is not
    /// registered at all.
    pub fn available_pieces(&self, file: &str, group: &str) -> Option<Vec<u32>> {
        let paths = self.paths.lock().unwrap();
        let pieces = self.pieces.lock().unwrap();
        let path = paths.get(&(file.to_string(), group.to_string()))?;
        Some(
            pieces
                .get(path)
                .map(|set| set.iter().copied().collect())
                .unwrap_or_default(),
        )
    }

    pub fn has_piece(&self, path: &Path, piece: u32) -> bool {
        let pieces = self.pieces.lock().unwrap();
        pieces.get(path).is_some_and(|set| set.contains(&piece))
    }

    /// Snapshot of every registered (file, group) -> path binding, for
    /// login-time re-advertisement.
    pub fn shared_files(&self) -> Vec<((String, String), PathBuf)> {
        let paths = self.paths.lock().unwrap();
        let mut all: Vec<((String, String), PathBuf)> =
            paths.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        all.sort();
        all
    }

    /// Forget which pieces are held. Runs at logout; the path registry stays.
    pub fn clear_pieces(&self) {
        let mut pieces = self.pieces.lock().unwrap();
        pieces.clear();
    }
}

impl Default for PieceStore {
    fn default() -> Self {
        PieceStore::new()
    }
}
