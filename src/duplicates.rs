//! Duplicate class detection over raw class bytes.
//!
//! Every class seen is hashed; the first location of a name is the baseline
//! and each later location is classified as identical or divergent against
//! it. Whether a pair aborts the scan is decided by [`DuplicateConfig`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::Digest;

use crate::config::DuplicateConfig;
use crate::error::{Error, Result};
use crate::root::{ClassLocation, RootSource};
use crate::scan::{self, ClassVisitor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    #[default]
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "MD5",
            HashAlgorithm::Sha1 => "SHA-1",
            HashAlgorithm::Sha256 => "SHA-256",
            HashAlgorithm::Sha512 => "SHA-512",
        }
    }

    pub fn digest(&self, bytes: &[u8]) -> Vec<u8> {
        match self {
            HashAlgorithm::Md5 => md5::Md5::digest(bytes).to_vec(),
            HashAlgorithm::Sha1 => sha1::Sha1::digest(bytes).to_vec(),
            HashAlgorithm::Sha256 => sha2::Sha256::digest(bytes).to_vec(),
            HashAlgorithm::Sha512 => sha2::Sha512::digest(bytes).to_vec(),
        }
    }

    pub fn digest_reader(&self, reader: &mut dyn Read) -> std::io::Result<Vec<u8>> {
        match self {
            HashAlgorithm::Md5 => hash_stream::<md5::Md5>(reader),
            HashAlgorithm::Sha1 => hash_stream::<sha1::Sha1>(reader),
            HashAlgorithm::Sha256 => hash_stream::<sha2::Sha256>(reader),
            HashAlgorithm::Sha512 => hash_stream::<sha2::Sha512>(reader),
        }
    }
}

fn hash_stream<D: Digest>(reader: &mut dyn Read) -> std::io::Result<Vec<u8>> {
    let mut hasher = D::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_vec())
}

impl FromStr for HashAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().replace('_', "-").as_str() {
            "MD5" | "MD-5" => Ok(HashAlgorithm::Md5),
            "SHA1" | "SHA-1" => Ok(HashAlgorithm::Sha1),
            "SHA256" | "SHA-256" => Ok(HashAlgorithm::Sha256),
            "SHA512" | "SHA-512" => Ok(HashAlgorithm::Sha512),
            _ => Err(Error::UnknownHashAlgorithm(s.to_string())),
        }
    }
}

impl TryFrom<String> for HashAlgorithm {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<HashAlgorithm> for String {
    fn from(value: HashAlgorithm) -> Self {
        value.name().to_string()
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateEntry {
    pub location: ClassLocation,
    /// Hex encoded content digest.
    pub digest: String,
    /// Whether the content matches the first location of the name.
    pub identical: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateGroup {
    pub class_name: String,
    /// First-seen location first.
    pub entries: Vec<DuplicateEntry>,
}

impl DuplicateGroup {
    pub fn is_identical(&self) -> bool {
        self.entries.iter().all(|e| e.identical)
    }
}

pub struct DuplicateClassFinder {
    config: DuplicateConfig,
    first_seen: HashMap<String, (ClassLocation, Vec<u8>)>,
    duplicates: BTreeMap<String, Vec<DuplicateEntry>>,
    visited: usize,
}

impl DuplicateClassFinder {
    pub fn new(config: DuplicateConfig) -> Self {
        Self {
            config,
            first_seen: HashMap::new(),
            duplicates: BTreeMap::new(),
            visited: 0,
        }
    }

    pub fn config(&self) -> &DuplicateConfig {
        &self.config
    }

    /// Scans `roots` in order. Digests of one root are computed on one rayon
    /// worker, roots in parallel; classification then runs in root order so
    /// the baseline of every name is its first location.
    pub fn scan<P: AsRef<Path> + Sync>(&mut self, roots: &[P]) -> Result<()> {
        let algorithm = self.config.hash_algorithm;
        let digested = roots
            .par_iter()
            .map(|root| digest_root(root.as_ref(), algorithm))
            .collect::<Result<Vec<_>>>()?;
        for (location, digest) in digested.into_iter().flatten() {
            self.record(location, digest)?;
        }
        Ok(())
    }

    /// Registers one class. Fails with [`Error::DuplicateClass`] when the
    /// configured policy does not allow the duplicate.
    pub fn record(&mut self, location: ClassLocation, digest: Vec<u8>) -> Result<()> {
        self.visited += 1;
        let name = location.class_name().to_string();
        let Some((first, first_digest)) = self.first_seen.get(&name) else {
            tracing::trace!(class = %name, %location, "class visited");
            self.first_seen.insert(name, (location, digest));
            return Ok(());
        };

        let identical = *first_digest == digest;
        let entries = self.duplicates.entry(name.clone()).or_insert_with(|| {
            vec![DuplicateEntry {
                location: first.clone(),
                digest: hex::encode(first_digest),
                identical: true,
            }]
        });
        entries.push(DuplicateEntry {
            location: location.clone(),
            digest: hex::encode(&digest),
            identical,
        });

        if identical {
            tracing::info!(class = %name, %first, duplicate = %location, "identical duplicate class");
        } else {
            tracing::warn!(class = %name, %first, duplicate = %location, "divergent duplicate class");
        }

        if identical && self.config.ignore_equal_duplicates {
            return Ok(());
        }
        if self.config.continue_on_duplicate {
            return Ok(());
        }
        Err(Error::DuplicateClass {
            name,
            first: first.clone(),
            second: location,
        })
    }

    pub fn visited(&self) -> usize {
        self.visited
    }

    pub fn has_duplicates(&self) -> bool {
        !self.duplicates.is_empty()
    }

    /// All recorded groups, sorted by class name.
    pub fn duplicate_groups(&self) -> Vec<DuplicateGroup> {
        self.duplicates
            .iter()
            .map(|(name, entries)| DuplicateGroup {
                class_name: name.clone(),
                entries: entries.clone(),
            })
            .collect()
    }
}

impl ClassVisitor for DuplicateClassFinder {
    fn visit(&mut self, location: &ClassLocation, content: &mut dyn Read) -> Result<()> {
        match self.config.hash_algorithm.digest_reader(content) {
            Ok(digest) => self.record(location.clone(), digest),
            Err(error) => self.visit_failed(location, error),
        }
    }

    fn visit_failed(&mut self, location: &ClassLocation, error: std::io::Error) -> Result<()> {
        let err = Error::ClassIo {
            root: location.root_path().to_path_buf(),
            name: location.class_name().to_string(),
            source: error,
        };
        tracing::error!(%err, "skipping class");
        Ok(())
    }
}

struct Digests {
    algorithm: HashAlgorithm,
    out: Vec<(ClassLocation, Vec<u8>)>,
}

impl ClassVisitor for Digests {
    fn visit(&mut self, location: &ClassLocation, content: &mut dyn Read) -> Result<()> {
        match self.algorithm.digest_reader(content) {
            Ok(digest) => {
                self.out.push((location.clone(), digest));
                Ok(())
            }
            Err(error) => self.visit_failed(location, error),
        }
    }

    fn visit_failed(&mut self, location: &ClassLocation, error: std::io::Error) -> Result<()> {
        tracing::error!(%location, %error, "skipping unreadable class");
        Ok(())
    }
}

fn digest_root(path: &Path, algorithm: HashAlgorithm) -> Result<Vec<(ClassLocation, Vec<u8>)>> {
    let source = RootSource::open(path)?;
    let mut visitor = Digests {
        algorithm,
        out: Vec::new(),
    };
    scan::traverse_source(&source, &mut visitor)?;
    tracing::debug!(root = %path.display(), classes = visitor.out.len(), "root digested");
    Ok(visitor.out)
}

/// Scans `roots` with `config` and returns the finder, including when the
/// policy aborted the scan part way.
pub fn find_duplicates(
    roots: &[PathBuf],
    config: DuplicateConfig,
) -> (DuplicateClassFinder, Result<()>) {
    let mut finder = DuplicateClassFinder::new(config);
    let outcome = finder.scan(roots);
    (finder, outcome)
}
