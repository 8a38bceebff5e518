// src/credential/store.rs
use chrono::{DateTime, Utc};
use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};
use tracing::debug;
use uuid::Uuid;

use super::types::{Credential, CredentialKind};
use crate::cert::verification::summarize;
use crate::error::{CredentialError, Result};

/// Marks a default value as "read this other file instead".
pub const REDIRECT_PREFIX: &str = "<<<";

/// Hex SHA-256 of `content`.
pub fn fingerprint(content: &[u8]) -> String {
    hex::encode(openssl::sha::sha256(content))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultValue {
    Literal(Vec<u8>),
    Redirect(PathBuf),
}

impl DefaultValue {
    /// Parses `"<<<path"` as a redirect (relative paths resolve against
    /// `base_dir`); anything else is literal content.
    pub fn parse(value: &str, base_dir: &Path) -> Self {
        match value.strip_prefix(REDIRECT_PREFIX) {
            Some(target) => Self::Redirect(base_dir.join(target)),
            None => Self::Literal(value.as_bytes().to_vec()),
        }
    }
}

/// Local directory holding raw credential files.
#[derive(Debug, Clone)]
pub struct RawCredentialStore {
    dir: PathBuf,
}

impl RawCredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    /// Loads `path`, falling back to `default` when the file does not exist.
    ///
    /// A redirect default loads the target file and reports it as the
    /// credential's source, so anything keyed on the source path (the
    /// encrypted cache) is shared with the target.
    pub fn read(
        &self,
        name: &str,
        kind: CredentialKind,
        path: &Path,
        default: Option<&DefaultValue>,
    ) -> Result<Credential> {
        if let Some(content) = read_if_exists(path)? {
            return Ok(Credential {
                name: name.to_string(),
                kind,
                content,
                source_path: path.to_path_buf(),
            });
        }

        match default {
            Some(DefaultValue::Literal(content)) => {
                debug!("{} not found, using default value", path.display());
                Ok(Credential {
                    name: name.to_string(),
                    kind,
                    content: content.clone(),
                    source_path: path.to_path_buf(),
                })
            }
            Some(DefaultValue::Redirect(target)) => {
                debug!("{} not found, reading {} instead", path.display(), target.display());
                let content = read_if_exists(target)?.ok_or_else(|| CredentialError::MissingRequired {
                    name: name.to_string(),
                    path: target.clone(),
                })?;
                Ok(Credential {
                    name: name.to_string(),
                    kind,
                    content,
                    source_path: target.clone(),
                })
            }
            None => Err(CredentialError::MissingRequired {
                name: name.to_string(),
                path: path.to_path_buf(),
            }),
        }
    }

    /// True when `path` is absent or empty.
    pub fn is_blank(&self, path: &Path) -> Result<bool> {
        match fs::metadata(path) {
            Ok(meta) => Ok(meta.len() == 0),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(CredentialError::io(path, e)),
        }
    }

    pub fn write(&self, credential: &Credential) -> Result<()> {
        write_private(&credential.source_path, &credential.content)
    }

    pub fn check_expiry(&self, credential: &Credential) -> Result<()> {
        check_expiry_at(credential, Utc::now())
    }
}

/// Fails if any certificate in `credential` is past its `NotAfter` at `now`.
pub fn check_expiry_at(credential: &Credential, now: DateTime<Utc>) -> Result<()> {
    for cert in summarize(&credential.source_path, &credential.content)? {
        if now > cert.not_after {
            return Err(CredentialError::Expired {
                name: credential.name.clone(),
                path: credential.source_path.clone(),
                subject: cert.subject,
                issuer: cert.issuer,
                not_before: cert.not_before,
                not_after: cert.not_after,
            });
        }
    }
    Ok(())
}

fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CredentialError::io(path, e)),
    }
}

/// Writes `content` with owner-only permissions, replacing `path` atomically.
pub fn write_private(path: &Path, content: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(|e| CredentialError::io(&parent, e))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let temp_path = parent.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

    let result = write_owner_only(&temp_path, content).and_then(|_| fs::rename(&temp_path, path));
    if let Err(e) = result {
        let _ = fs::remove_file(&temp_path);
        return Err(CredentialError::io(path, e));
    }
    Ok(())
}

fn write_owner_only(path: &Path, content: &[u8]) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(content)?;
    file.sync_all()
}
