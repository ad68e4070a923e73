use std::path::{Path, PathBuf};
use std::{fs, io};

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("no endpoint file at {}", .0.display())]
    Missing(PathBuf),
    #[error("endpoint file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("daemon process {0} is not running")]
    Dead(i32),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct Contents {
    pid: i32,
}

/// The file a running daemon uses to advertise itself.
#[derive(Debug, Clone)]
pub struct EndpointFile {
    path: PathBuf,
}

impl EndpointFile {
    pub fn new(path: PathBuf) -> Self { EndpointFile { path } }

    pub fn path(&self) -> &Path { &self.path }

    pub fn publish(&self, pid: i32) -> Result<(), EndpointError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(&Contents { pid })?)?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), pid, "Published endpoint");
        Ok(())
    }

    pub fn remove(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed endpoint file"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(path = %self.path.display(), %err, "Failed to remove endpoint file"),
        }
    }

    /// Returns the pid of a live daemon. A corrupt file, or one naming a
    /// process that no longer exists, is deleted.
    pub fn live_pid(&self) -> Result<i32, EndpointError> {
        let buf = match fs::read(&self.path) {
            Ok(buf) => buf,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(EndpointError::Missing(self.path.clone()));
            }
            Err(err) => return Err(err.into()),
        };
        let pid = match serde_json::from_slice::<Contents>(&buf) {
            Ok(Contents { pid }) if pid > 0 => pid,
            Ok(Contents { pid }) => {
                self.remove();
                return Err(EndpointError::Dead(pid));
            }
            Err(err) => {
                self.remove();
                return Err(err.into());
            }
        };
        if !process_alive(pid) {
            warn!(pid, "Endpoint file names a dead process; removing it");
            self.remove();
            return Err(EndpointError::Dead(pid));
        }
        Ok(pid)
    }
}

fn process_alive(pid: i32) -> bool {
    // EPERM means the process exists but belongs to someone else.
    matches!(kill(Pid::from_raw(pid), None), Ok(()) | Err(Errno::EPERM))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> (tempfile::TempDir, EndpointFile) {
        let dir = tempfile::tempdir().unwrap();
        let file = EndpointFile::new(dir.path().join("daemon.json"));
        (dir, file)
    }

    /// A pid that was certainly running once and has since exited.
    fn dead_pid() -> i32 {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id() as i32;
        child.wait().unwrap();
        pid
    }

    #[test]
    fn own_pid_is_live() {
        let (_dir, file) = endpoint();
        let pid = std::process::id() as i32;
        file.publish(pid).unwrap();
        assert_eq!(file.live_pid().unwrap(), pid);
        assert!(file.path().exists());
    }

    #[test]
    fn dead_pid_deletes_file() {
        let (_dir, file) = endpoint();
        file.publish(dead_pid()).unwrap();
        assert!(matches!(file.live_pid(), Err(EndpointError::Dead(_))));
        assert!(!file.path().exists());
    }

    #[test]
    fn corrupt_file_is_deleted() {
        let (_dir, file) = endpoint();
        fs::write(file.path(), "pid=12").unwrap();
        assert!(matches!(file.live_pid(), Err(EndpointError::Corrupt(_))));
        assert!(!file.path().exists());
    }

    #[test]
    fn missing_file_is_reported() {
        let (_dir, file) = endpoint();
        assert!(matches!(file.live_pid(), Err(EndpointError::Missing(_))));
        file.remove();
    }

    #[test]
    fn missing_file_message_names_the_path() {
        let (_dir, file) = endpoint();
        let err = file.live_pid().unwrap_err();
        assert_eq!(err.to_string(), format!("no endpoint file at {}", file.path().display()));
    }
}
