//! Output path allocation for trimmed files.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Scratch directory used when the caller does not supply one.
pub fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join("trimcut")
}

/// Allocate a fresh output path under `dir`.
///
/// Names combine a wall-clock millisecond stamp with a process-local
/// sequence number so trims started within the same millisecond still
/// get distinct paths.
pub fn allocate_output_path(dir: &Path) -> PathBuf {
    static SEQUENCE: AtomicU64 = AtomicU64::new(0);

    let millis = chrono::Utc::now().timestamp_millis();
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    dir.join(format!("trimmed_{millis}_{seq}.mp4"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_distinct() {
        let dir = PathBuf::from("/tmp/scratch");
        let a = allocate_output_path(&dir);
        let b = allocate_output_path(&dir);
        assert_ne!(a, b);
        assert!(a.starts_with(&dir));
        assert!(a.extension().is_some_and(|e| e == "mp4"));
    }

    #[test]
    fn test_name_shape() {
        let path = allocate_output_path(Path::new("/tmp"));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("trimmed_"));
        assert!(name.ends_with(".mp4"));
    }
}
