use crate::error::AppError;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};

const LOCK_WAIT_TIMEOUT: Duration = Duration::from_secs(10);
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(20);
const LOCK_STALE_AFTER: Duration = Duration::from_secs(30);

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(0);

/// Exclusive lock held for one read-modify-write of a JSON document.
///
/// The lock file carries a token unique to this guard; dropping the guard only
/// removes the file while it still carries that token.
pub struct FileLockGuard {
    path: PathBuf,
    token: String,
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        if read_token(&self.path).as_deref() == Some(self.token.as_str()) {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

pub fn lock_path_for(document: &Path) -> PathBuf {
    sibling_path(document, ".lock")
}

fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

fn next_token() -> String {
    format!(
        "{} {}",
        std::process::id(),
        NEXT_TOKEN.fetch_add(1, Ordering::Relaxed)
    )
}

fn read_token(lock_path: &Path) -> Option<String> {
    std::fs::read_to_string(lock_path)
        .ok()
        .map(|content| content.trim().to_string())
}

pub fn acquire(document: &Path) -> Result<FileLockGuard, AppError> {
    let lock_path = lock_path_for(document);
    let started = Instant::now();

    loop {
        match try_acquire(&lock_path) {
            Ok(guard) => return Ok(guard),
            Err(LockState::Held) => {
                if started.elapsed() >= LOCK_WAIT_TIMEOUT {
                    return Err(AppError::io(format!(
                        "timed out waiting for lock {}",
                        lock_path.display()
                    )));
                }
                std::thread::sleep(LOCK_RETRY_DELAY);
            }
            Err(LockState::Stale(observed)) => {
                tracing::warn!(path = %lock_path.display(), "removing stale lock file");
                break_stale_lock(&lock_path, &observed);
            }
            Err(LockState::Failed(message)) => return Err(AppError::io(message)),
        }
    }
}

#[derive(Debug)]
enum LockState {
    Held,
    Stale(String),
    Failed(String),
}

fn try_acquire(lock_path: &Path) -> Result<FileLockGuard, LockState> {
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| LockState::Failed(err.to_string()))?;
    }

    match OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(lock_path)
    {
        Ok(mut file) => {
            let token = next_token();
            let _ = writeln!(file, "{token}");
            Ok(FileLockGuard {
                path: lock_path.to_path_buf(),
                token,
            })
        }
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
            let age = std::fs::metadata(lock_path)
                .and_then(|meta| meta.modified())
                .ok()
                .and_then(|modified| SystemTime::now().duration_since(modified).ok());
            match age {
                Some(age) if age > LOCK_STALE_AFTER => {
                    Err(LockState::Stale(read_token(lock_path).unwrap_or_default()))
                }
                _ => Err(LockState::Held),
            }
        }
        Err(err) => Err(LockState::Failed(err.to_string())),
    }
}

/// Moves the lock aside and deletes it only if it is still the stale lock
/// that was observed. A fresh lock taken by another waiter in the meantime is
/// linked back into place.
fn break_stale_lock(lock_path: &Path, observed: &str) {
    let aside = sibling_path(lock_path, &format!(".{}.stale", next_token().replace(' ', "-")));
    if std::fs::rename(lock_path, &aside).is_err() {
        return;
    }

    if read_token(&aside).as_deref() != Some(observed) {
        let _ = std::fs::hard_link(&aside, lock_path);
    }
    let _ = std::fs::remove_file(&aside);
}

/// Replaces `path` with `content` via a sibling temp file and a rename.
pub fn write_atomic(path: &Path, content: &str) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| AppError::io(err.to_string()))?;
    }

    let mut temp_name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    temp_name.push(format!(".{}.tmp", next_token().replace(' ', "-")));
    let temp_path = path.with_file_name(temp_name);

    std::fs::write(&temp_path, content).map_err(|err| AppError::io(err.to_string()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let permissions = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&temp_path, permissions)
            .map_err(|err| AppError::io(err.to_string()))?;
    }

    std::fs::rename(&temp_path, path).map_err(|err| AppError::io(err.to_string()))
}
