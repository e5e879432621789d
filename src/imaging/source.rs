//! Where an image is read from.

use super::backend::ImagingError;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Name used for stream sources that were not given one.
pub const STREAM_NAME: &str = "stream";

/// Input to [`ImageBackend::read`](super::backend::ImageBackend::read).
///
/// - `FilePath`: read from disk. The name defaults to the file stem.
/// - `Binary`: an in-memory blob. A name is mandatory, since there is
///   nothing else to identify the image by.
/// - `Stream`: any open reader (stdin, a socket, an HTTP body).
pub enum ReadSource {
    FilePath {
        path: PathBuf,
        name: Option<String>,
    },
    Binary {
        bytes: Vec<u8>,
        name: String,
    },
    Stream {
        reader: Box<dyn Read + Send>,
        name: Option<String>,
    },
}

impl ReadSource {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        ReadSource::FilePath {
            path: path.into(),
            name: None,
        }
    }

    pub fn binary(bytes: impl Into<Vec<u8>>, name: impl Into<String>) -> Self {
        ReadSource::Binary {
            bytes: bytes.into(),
            name: name.into(),
        }
    }

    pub fn stream(reader: impl Read + Send + 'static) -> Self {
        ReadSource::Stream {
            reader: Box::new(reader),
            name: None,
        }
    }

    /// Attach an explicit name. Empty names are ignored for paths and
    /// streams, which have their own fallbacks.
    pub fn named(self, new_name: impl Into<String>) -> Self {
        let new_name = new_name.into();
        match self {
            ReadSource::FilePath { path, .. } => ReadSource::FilePath {
                path,
                name: Some(new_name),
            },
            ReadSource::Binary { bytes, .. } => ReadSource::Binary {
                bytes,
                name: new_name,
            },
            ReadSource::Stream { reader, .. } => ReadSource::Stream {
                reader,
                name: Some(new_name),
            },
        }
    }

    /// Resolved display name for this source.
    pub fn name(&self) -> String {
        match self {
            ReadSource::FilePath { path, name } => non_empty(name.as_deref())
                .map(str::to_string)
                .unwrap_or_else(|| file_stem(path)),
            ReadSource::Binary { name, .. } => name.clone(),
            ReadSource::Stream { name, .. } => non_empty(name.as_deref())
                .unwrap_or(STREAM_NAME)
                .to_string(),
        }
    }

    /// Consume the source, returning its resolved name and raw bytes.
    pub fn into_bytes(self) -> Result<(String, Vec<u8>), ImagingError> {
        let name = self.name();
        match self {
            ReadSource::FilePath { path, .. } => {
                let mut file =
                    File::open(&path).map_err(|_| ImagingError::NotReadable(path.clone()))?;
                let mut bytes = Vec::new();
                file.read_to_end(&mut bytes)?;
                Ok((name, bytes))
            }
            ReadSource::Binary { bytes, name } => {
                if name.is_empty() {
                    return Err(ImagingError::MissingName);
                }
                Ok((name, bytes))
            }
            ReadSource::Stream { mut reader, .. } => {
                let mut bytes = Vec::new();
                reader.read_to_end(&mut bytes)?;
                Ok((name, bytes))
            }
        }
    }
}

impl fmt::Debug for ReadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadSource::FilePath { path, name } => f
                .debug_struct("FilePath")
                .field("path", path)
                .field("name", name)
                .finish(),
            ReadSource::Binary { bytes, name } => f
                .debug_struct("Binary")
                .field("len", &bytes.len())
                .field("name", name)
                .finish(),
            ReadSource::Stream { name, .. } => {
                f.debug_struct("Stream").field("name", name).finish()
            }
        }
    }
}

fn non_empty(name: Option<&str>) -> Option<&str> {
    name.filter(|n| !n.is_empty())
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
