//! Filesystem recording sink

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::application::ports::{RecordingSink, SaveError};
use crate::domain::recording::AudioData;

/// Highest numbered suffix tried before giving up
const MAX_SUFFIX: u32 = 9999;

/// Writes recordings into a directory without overwriting existing files
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `audio.wav`, `audio (1).wav`, `audio (2).wav`, ...
    fn candidate(&self, file_name: &str, n: u32) -> PathBuf {
        if n == 0 {
            return self.dir.join(file_name);
        }
        let path = Path::new(file_name);
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_name.to_string());
        let name = match path.extension() {
            Some(ext) => format!("{} ({}).{}", stem, n, ext.to_string_lossy()),
            None => format!("{} ({})", stem, n),
        };
        self.dir.join(name)
    }
}

#[async_trait]
impl RecordingSink for FileSink {
    async fn save(&self, audio: &AudioData, file_name: &str) -> Result<PathBuf, SaveError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| SaveError::CreateDir(format!("{}: {}", self.dir.display(), e)))?;

        for n in 0..=MAX_SUFFIX {
            let path = self.candidate(file_name, n);
            let mut file = match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(SaveError::Write(format!("{}: {}", path.display(), e))),
            };

            file.write_all(audio.data())
                .await
                .map_err(|e| SaveError::Write(format!("{}: {}", path.display(), e)))?;
            file.flush()
                .await
                .map_err(|e| SaveError::Write(format!("{}: {}", path.display(), e)))?;
            return Ok(path);
        }

        Err(SaveError::Write(format!(
            "No free file name for {} in {}",
            file_name,
            self.dir.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::recording::AudioFormat;

    #[test]
    fn candidate_names() {
        let sink = FileSink::new("/out");
        assert_eq!(sink.candidate("audio.wav", 0), PathBuf::from("/out/audio.wav"));
        assert_eq!(sink.candidate("audio.wav", 2), PathBuf::from("/out/audio (2).wav"));
        assert_eq!(sink.candidate("audio", 1), PathBuf::from("/out/audio (1)"));
    }

    #[tokio::test]
    async fn save_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path().join("recordings"));
        let first = AudioData::new(vec![1, 2, 3], AudioFormat::Wav);
        let second = AudioData::new(vec![4, 5], AudioFormat::Wav);

        let a = sink.save(&first, "audio.wav").await.unwrap();
        let b = sink.save(&second, "audio.wav").await.unwrap();

        assert_eq!(a.file_name().unwrap(), "audio.wav");
        assert_eq!(b.file_name().unwrap(), "audio (1).wav");
        assert_eq!(std::fs::read(&a).unwrap(), vec![1, 2, 3]);
        assert_eq!(std::fs::read(&b).unwrap(), vec![4, 5]);
    }
}
