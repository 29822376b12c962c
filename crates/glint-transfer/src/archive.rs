//! Archive packing on the sender side, extraction and download on the receiver side.

use std::collections::HashSet;
use std::io::{Cursor, Read, Write};
use std::path::{Component, Path, PathBuf};

use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("nothing to archive")]
    Empty,

    #[error("invalid entry name: {0}")]
    InvalidName(String),

    #[error("duplicate entry name: {0}")]
    DuplicateName(String),

    #[error("corrupt archive: {0}")]
    Corrupt(#[from] ZipError),

    #[error("archive i/o: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("invalid file name: {0}")]
    InvalidName(String),

    #[error("cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A file selected for sending, or extracted after receiving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedBuffer {
    pub name: String,
    pub data: Vec<u8>,
}

impl NamedBuffer {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

/// Packs selected files into one archive buffer and reverses it.
pub trait Archiver: Send + Sync {
    fn pack(&self, entries: &[NamedBuffer]) -> Result<Vec<u8>, ArchiveError>;

    fn unpack(&self, archive: &[u8]) -> Result<Vec<NamedBuffer>, ArchiveError>;

    /// Contents of the entry called `name`, if the archive holds one.
    fn extract(&self, archive: &[u8], name: &str) -> Result<Option<Vec<u8>>, ArchiveError> {
        Ok(self
            .unpack(archive)?
            .into_iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.data))
    }
}

/// Standard zip archive, one deflated entry per file.
///
/// Entries must be plain file names; directories inside a received archive
/// are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipArchiver;

impl Archiver for ZipArchiver {
    fn pack(&self, entries: &[NamedBuffer]) -> Result<Vec<u8>, ArchiveError> {
        if entries.is_empty() {
            return Err(ArchiveError::Empty);
        }
        let mut seen = HashSet::new();
        for entry in entries {
            validate_file_name(&entry.name).map_err(ArchiveError::InvalidName)?;
            if !seen.insert(entry.name.as_str()) {
                return Err(ArchiveError::DuplicateName(entry.name.clone()));
            }
        }

        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for entry in entries {
            writer.start_file(entry.name.as_str(), options)?;
            writer.write_all(&entry.data)?;
        }
        Ok(writer.finish()?.into_inner())
    }

    fn unpack(&self, archive: &[u8]) -> Result<Vec<NamedBuffer>, ArchiveError> {
        let mut zip = ZipArchive::new(Cursor::new(archive))?;
        let mut entries = Vec::with_capacity(zip.len());
        for index in 0..zip.len() {
            let mut file = zip.by_index(index)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            validate_file_name(&name).map_err(ArchiveError::InvalidName)?;
            let mut data = Vec::new();
            file.read_to_end(&mut data)?;
            entries.push(NamedBuffer { name, data });
        }
        Ok(entries)
    }

    fn extract(&self, archive: &[u8], name: &str) -> Result<Option<Vec<u8>>, ArchiveError> {
        let mut zip = ZipArchive::new(Cursor::new(archive))?;
        match zip.by_name(name) {
            Ok(mut file) => {
                let mut data = Vec::new();
                file.read_to_end(&mut data)?;
                Ok(Some(data))
            }
            Err(ZipError::FileNotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Where received files are offered to the user.
pub trait DownloadSink {
    fn offer(&mut self, data: &[u8], suggested_name: &str) -> Result<(), SinkError>;
}

/// Writes offered files into one directory.
#[derive(Debug)]
pub struct DirectorySink {
    dir: PathBuf,
    written: Vec<PathBuf>,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            written: Vec::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Paths written so far, in order.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl DownloadSink for DirectorySink {
    fn offer(&mut self, data: &[u8], suggested_name: &str) -> Result<(), SinkError> {
        validate_file_name(suggested_name).map_err(SinkError::InvalidName)?;

        std::fs::create_dir_all(&self.dir).map_err(|source| SinkError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.dir.join(suggested_name);
        std::fs::write(&path, data).map_err(|source| SinkError::Io {
            path: path.clone(),
            source,
        })?;

        tracing::info!(path = %path.display(), bytes = data.len(), "file saved");
        self.written.push(path);
        Ok(())
    }
}

/// Collects offered files in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub files: Vec<NamedBuffer>,
}

impl DownloadSink for MemorySink {
    fn offer(&mut self, data: &[u8], suggested_name: &str) -> Result<(), SinkError> {
        self.files.push(NamedBuffer::new(suggested_name, data));
        Ok(())
    }
}

/// A name must be a single plain path component: no separators, no
/// traversal, no absolute or drive-prefixed paths.
pub fn validate_file_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("empty name".into());
    }
    if name.contains('/') || name.contains('\\') {
        return Err(format!("path separators not allowed: {name}"));
    }
    if name.len() >= 2 && name.as_bytes()[1] == b':' {
        return Err(format!("drive prefix not allowed: {name}"));
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(format!("not a plain file name: {name}")),
    }
}
