//! Advisory PID files. Liveness is always verified with a zero-signal
//! probe; a stale file is tolerated and rewritten.

use std::path::Path;

use crate::error::Result;

pub fn read(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path)
        .ok()?
        .trim()
        .parse::<u32>()
        .ok()
}

pub fn write(path: &Path, pid: u32) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, format!("{pid}\n"))?;
    Ok(())
}

/// Remove the file iff it still contains the matching PID; another
/// instance may have rewritten it in the meantime.
pub fn remove_if_matches(path: &Path, pid: u32) {
    if read(path) == Some(pid) {
        let _ = std::fs::remove_file(path);
    }
}

/// Zero-signal probe: does the process answer without being touched?
#[cfg(unix)]
pub fn alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[cfg(not(unix))]
pub fn alive(_pid: u32) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_read_remove() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gog-watch.pid");

        write(&path, 12345).unwrap();
        assert_eq!(read(&path), Some(12345));

        // A mismatched PID leaves the file alone.
        remove_if_matches(&path, 999);
        assert!(path.exists());

        remove_if_matches(&path, 12345);
        assert!(!path.exists());
    }

    #[test]
    fn test_garbage_file_reads_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.pid");
        std::fs::write(&path, "not a pid").unwrap();
        assert_eq!(read(&path), None);
    }

    #[test]
    #[cfg(unix)]
    fn test_own_process_is_alive() {
        assert!(alive(std::process::id()));
        assert!(!alive(0));
    }
}
