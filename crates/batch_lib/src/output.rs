//! The output file shared by every worker of a run.

use std::{
    fmt, io,
    path::{Path, PathBuf},
};

use chrono::{DateTime, TimeZone};
use tokio::{
    fs::{File, OpenOptions},
    io::AsyncWriteExt as _,
    sync::Mutex,
};

use crate::Mode;

const TIMESTAMP_FORMAT: &str = "%d-%m-%Y-%H-%M-%S";

/// A key with its value, as written in the output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordEntry {
    /// The key.
    pub key: String,
    /// The value, or `None` if the key doesn't exist.
    pub value: Option<String>,
}

impl RecordEntry {
    /// Returns the entry of the provided key and value.
    pub fn new<K: Into<String>>(key: K, value: Option<String>) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Formats the entry as a line of the output file, without escaping anything.
impl fmt::Display for RecordEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{}",
            self.key,
            self.value.as_deref().unwrap_or_default()
        )
    }
}

/// Returns the path of the output file of a run started at `now` with the keys file at `keys_path`.
pub fn output_path<Tz>(keys_path: &Path, mode: Mode, now: DateTime<Tz>) -> PathBuf
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let timestamp = now.format(TIMESTAMP_FORMAT);
    let mut path = keys_path.as_os_str().to_owned();
    match mode {
        Mode::Export => path.push(format!("-{timestamp}.csv")),
        Mode::Delete => path.push(format!("-deleted-{timestamp}.txt")),
    }
    PathBuf::from(path)
}

/// The file every worker appends its entries to.
///
/// Each call to [`OutputFile::append`] writes all its entries at once, so the lines of two
/// batches never interleave.
pub struct OutputFile {
    path: PathBuf,
    file: Mutex<File>,
}

impl OutputFile {
    /// Creates the file if it doesn't exist, and opens it in append mode.
    pub async fn create<P: Into<PathBuf>>(path: P) -> io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Returns the path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends the entries to the file, one per line.
    pub async fn append(&self, entries: &[RecordEntry]) -> io::Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut buf = String::new();
        for entry in entries {
            buf.push_str(&entry.to_string());
            buf.push('\n');
        }

        let mut file = self.file.lock().await;
        file.write_all(buf.as_bytes()).await?;
        file.flush().await
    }
}

#[cfg(test)]
mod tests {
    use std::{path::Path, sync::Arc};

    use chrono::{TimeZone as _, Utc};

    use crate::Mode;

    use super::{OutputFile, RecordEntry, output_path};

    #[test]
    fn entry_lines() {
        assert_eq!(
            RecordEntry::new("k", Some("v".to_owned())).to_string(),
            "k,v"
        );
        assert_eq!(RecordEntry::new("k", None).to_string(), "k,");
        // Embedded delimiters aren't escaped.
        assert_eq!(
            RecordEntry::new("k", Some("a,b".to_owned())).to_string(),
            "k,a,b"
        );
    }

    #[test]
    fn output_names() {
        let now = Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 1).unwrap();
        let keys = Path::new("/tmp/keys.txt");

        assert_eq!(
            output_path(keys, Mode::Export, now),
            Path::new("/tmp/keys.txt-07-03-2024-09-05-01.csv")
        );
        assert_eq!(
            output_path(keys, Mode::Delete, now),
            Path::new("/tmp/keys.txt-deleted-07-03-2024-09-05-01.txt")
        );
    }

    #[tokio::test]
    async fn concurrent_appends_keep_lines_whole() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let out = Arc::new(OutputFile::create(dir.path().join("out")).await?);

        let tasks = (0..8)
            .map(|t| {
                let out = out.clone();
                tokio::spawn(async move {
                    let entries = (0..100)
                        .map(|i| RecordEntry::new(format!("t{t}k{i}"), Some(format!("v{i}"))))
                        .collect::<Vec<_>>();
                    out.append(&entries).await
                })
            })
            .collect::<Vec<_>>();
        for task in tasks {
            task.await??;
        }

        let content = tokio::fs::read_to_string(out.path()).await?;
        let lines = content.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 800);

        // Each batch is contiguous.
        for chunk in lines.chunks(100) {
            let prefix = chunk[0].split('k').next().unwrap();
            assert!(chunk.iter().all(|l| l.starts_with(&format!("{prefix}k"))));
        }
        Ok(())
    }

    #[tokio::test]
    async fn appends_to_existing_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out");
        tokio::fs::write(&path, "old,1\n").await?;

        let out = OutputFile::create(&path).await?;
        out.append(&[RecordEntry::new("new", None)]).await?;
        out.append(&[]).await?;

        assert_eq!(tokio::fs::read_to_string(&path).await?, "old,1\nnew,\n");
        Ok(())
    }
}
