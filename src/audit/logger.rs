use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024; // 10MB

/// Append-only record of every git invocation
///
/// One line per command:
/// `[<rfc3339>] [<repo>] [exit:<code>] [<ms>ms] git <args...>`
#[derive(Debug)]
pub struct AuditLogger {
    log_path: PathBuf,
    // Serialises append + rotate across concurrent commands
    write_lock: Mutex<()>,
}

impl AuditLogger {
    /// Create an AuditLogger writing to `path`, creating parent directories
    pub fn with_path<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let log_path = path.as_ref().to_path_buf();

        if let Some(parent) = log_path.parent() {
            fs::create_dir_all(parent)?;
        }

        Ok(Self {
            log_path,
            write_lock: Mutex::new(()),
        })
    }

    /// Log a finished command (`git ...` as rendered for display).
    /// `exit_code` is `None` when the process never produced an exit status
    /// (launch failure or timeout).
    ///
    /// Blocking; async callers run it on the blocking pool.
    pub fn log_command(
        &self,
        repo_path: &Path,
        command: &str,
        exit_code: Option<i32>,
        elapsed: Duration,
    ) -> std::io::Result<()> {
        let exit = match exit_code {
            Some(code) => code.to_string(),
            None => "none".to_string(),
        };

        let log_entry = format!(
            "[{}] [{}] [exit:{}] [{}ms] {}\n",
            Utc::now().to_rfc3339(),
            repo_path.display(),
            exit,
            elapsed.as_millis(),
            command
        );

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| std::io::Error::other("audit log lock poisoned"))?;

        self.rotate_if_needed()?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;

        file.write_all(log_entry.as_bytes())?;
        file.flush()?;

        Ok(())
    }

    /// Rotate log file if it exceeds MAX_LOG_SIZE
    fn rotate_if_needed(&self) -> std::io::Result<()> {
        if !self.log_path.exists() {
            return Ok(());
        }

        let metadata = fs::metadata(&self.log_path)?;
        if metadata.len() > MAX_LOG_SIZE {
            // audit.log -> audit.log.1
            let mut backup = self.log_path.clone().into_os_string();
            backup.push(".1");
            fs::rename(&self.log_path, PathBuf::from(backup))?;
        }

        Ok(())
    }

    /// Get the path to the log file
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }
}
