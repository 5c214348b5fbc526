//! Content identity hashing for files, directory trees and multi-source
//! instructions
//!
//! Every hash carries a kind prefix (`file:`, `dir:`, `multi:`) so a hash
//! string alone says what it identifies. Tree and multi-source hashes sort
//! their inputs first, which makes them independent of the order in which
//! a filesystem walk happened to visit files.

use crate::error::{CacheError, CacheResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use walkdir::WalkDir;

const FILE_PREFIX: &str = "file:";
const DIR_PREFIX: &str = "dir:";
const MULTI_PREFIX: &str = "multi:";

/// Separator placed between sorted hashes before they are digested
const JOIN_SEPARATOR: &str = ",";

/// What a content hash identifies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashKind {
    /// A single regular file
    File,
    /// A directory subtree
    Directory,
    /// Several top-level sources of one instruction
    Multi,
}

impl HashKind {
    fn prefix(&self) -> &'static str {
        match self {
            Self::File => FILE_PREFIX,
            Self::Directory => DIR_PREFIX,
            Self::Multi => MULTI_PREFIX,
        }
    }
}

impl fmt::Display for HashKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::File => "file",
            Self::Directory => "dir",
            Self::Multi => "multi",
        };
        write!(f, "{}", name)
    }
}

/// A tagged content hash such as `file:9f86d0...`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    fn tagged(kind: HashKind, digest: impl AsRef<[u8]>) -> Self {
        Self(format!("{}{}", kind.prefix(), hex::encode(digest)))
    }

    /// Parse a tagged hash string, rejecting unknown prefixes and empty digests
    pub fn parse(s: &str) -> CacheResult<Self> {
        let hash = Self(s.to_string());
        match hash.digest() {
            Some(d) if !d.is_empty() => Ok(hash),
            _ => Err(CacheError::validation(format!(
                "content hash {:?} has no file:/dir:/multi: prefix or an empty digest",
                s
            ))),
        }
    }

    /// The kind encoded in the prefix
    pub fn kind(&self) -> Option<HashKind> {
        [HashKind::File, HashKind::Directory, HashKind::Multi]
            .into_iter()
            .find(|k| self.0.starts_with(k.prefix()))
    }

    /// The hex digest without the prefix
    pub fn digest(&self) -> Option<&str> {
        self.kind().map(|k| &self.0[k.prefix().len()..])
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ContentHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Writer that hashes everything passing through it
///
/// Used while downloading so the staged file is hashed in the same pass
/// that writes it. The resulting hash equals [`hash_file`] of the written
/// file.
pub struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
    written: u64,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            written: 0,
        }
    }

    /// Finish hashing, returning the inner writer, the `file:` hash and the byte count
    pub fn finish(self) -> (W, ContentHash, u64) {
        let hash = ContentHash::tagged(HashKind::File, self.hasher.finalize());
        (self.inner, hash, self.written)
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Hash a single file's bytes, tagged `file:`
pub fn hash_file(path: &Path) -> CacheResult<ContentHash> {
    let mut file = File::open(path)
        .map_err(|e| CacheError::io(format!("opening {} for hashing", path.display()), e))?;

    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| CacheError::io(format!("reading {} for hashing", path.display()), e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(ContentHash::tagged(HashKind::File, hasher.finalize()))
}

/// Hash a directory subtree, tagged `dir:`
///
/// Symlinks are not followed; only regular files contribute.
pub fn hash_directory(path: &Path) -> CacheResult<ContentHash> {
    let mut file_hashes = Vec::new();

    for entry in WalkDir::new(path).follow_links(false) {
        let entry = entry.map_err(|e| {
            let context = format!("walking {} for hashing", path.display());
            match e.into_io_error() {
                Some(source) => CacheError::io(context, source),
                None => CacheError::Internal(format!("{}: filesystem loop", context)),
            }
        })?;
        if entry.file_type().is_file() {
            file_hashes.push(hash_file(entry.path())?);
        }
    }

    Ok(directory_hash(file_hashes))
}

/// Combine already computed descendant file hashes into a `dir:` hash
fn directory_hash(file_hashes: impl IntoIterator<Item = ContentHash>) -> ContentHash {
    combine(HashKind::Directory, file_hashes)
}

/// Combine per-source hashes of one instruction into a `multi:` hash
pub fn hash_many(hashes: impl IntoIterator<Item = ContentHash>) -> ContentHash {
    combine(HashKind::Multi, hashes)
}

fn combine(kind: HashKind, hashes: impl IntoIterator<Item = ContentHash>) -> ContentHash {
    let mut parts: Vec<String> = hashes.into_iter().map(|h| h.0).collect();
    parts.sort();

    let mut hasher = Sha256::new();
    hasher.update(parts.join(JOIN_SEPARATOR).as_bytes());
    ContentHash::tagged(kind, hasher.finalize())
}
