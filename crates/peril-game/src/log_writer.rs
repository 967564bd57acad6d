//! Append-only game log file.

use std::path::{Path, PathBuf};
use chrono::SecondsFormat;
use peril_protocol::GameLog;
use tokio::io::AsyncWriteExt;

use crate::GameError;

/// Appends game log entries to a file, one line each.
#[derive(Debug, Clone)]
pub struct LogWriter {
    path: PathBuf,
}

impl LogWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one entry, creating the file if needed.
    ///
    /// # Errors
    /// Returns [`GameError::LogWrite`] if the file cannot be opened or
    /// written.
    pub async fn write(&self, log: &GameLog) -> Result<(), GameError> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(format_entry(log).as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Formats `<timestamp> <username>: <message>\n` with a UTC timestamp
/// to the second, e.g. `2024-02-29T12:34:56Z`.
pub fn format_entry(log: &GameLog) -> String {
    format!(
        "{} {}: {}\n",
        log.current_time.to_rfc3339_opts(SecondsFormat::Secs, true),
        log.username,
        log.message
    )
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn log_at(secs: i64, message: &str) -> GameLog {
        GameLog {
            current_time: Utc.timestamp_opt(secs, 0).unwrap(),
            username: "alice".into(),
            message: message.into(),
        }
    }

    #[test]
    fn test_format_entry() {
        assert_eq!(
            format_entry(&log_at(0, "hello")),
            "1970-01-01T00:00:00Z alice: hello\n"
        );
        // 2024-02-29 12:34:56 UTC
        assert_eq!(
            format_entry(&log_at(1_709_210_096, "leap")),
            "2024-02-29T12:34:56Z alice: leap\n"
        );
    }

    #[tokio::test]
    async fn test_write_appends_lines() {
        let path = std::env::temp_dir().join(format!(
            "peril-log-writer-{}-{}.log",
            std::process::id(),
            line!()
        ));
        let _ = tokio::fs::remove_file(&path).await;
        let writer = LogWriter::new(&path);

        writer.write(&log_at(0, "first")).await.unwrap();
        writer.write(&log_at(60, "second")).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(
            contents,
            "1970-01-01T00:00:00Z alice: first\n1970-01-01T00:01:00Z alice: second\n"
        );
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_write_to_missing_directory_fails() {
        let writer = LogWriter::new("/nonexistent-peril-dir/game.log");
        let err = writer.write(&log_at(0, "x")).await.unwrap_err();
        assert!(matches!(err, GameError::LogWrite(_)));
    }
}
