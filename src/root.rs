//! Class locations, packages and roots.
//!
//! A root is a class directory or an archive. It is listed once when it is
//! opened; afterwards only the bytes of individual classes are read on demand.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use memmap2::Mmap;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use zip::ZipArchive;

use crate::error::{Error, Result};
use crate::scan::{self, class_name_to_class_path};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RootKind {
    Directory,
    Archive,
}

/// The backing store of a root.
pub struct RootSource {
    path: PathBuf,
    kind: RootKind,
    archive: OnceLock<Mmap>,
}

impl RootSource {
    pub fn open(path: &Path) -> Result<Arc<Self>> {
        let meta = std::fs::metadata(path).map_err(|source| Error::RootIo {
            root: path.to_path_buf(),
            source,
        })?;
        let kind = if meta.is_dir() {
            RootKind::Directory
        } else {
            RootKind::Archive
        };
        Ok(Self::new(path.to_path_buf(), kind))
    }

    pub fn new(path: PathBuf, kind: RootKind) -> Arc<Self> {
        Arc::new(Self {
            path,
            kind,
            archive: OnceLock::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> RootKind {
        self.kind
    }

    pub(crate) fn archive_bytes(&self) -> std::io::Result<&[u8]> {
        if let Some(mmap) = self.archive.get() {
            return Ok(&mmap[..]);
        }
        let mmap = scan::map_archive(&self.path)?;
        let _ = self.archive.set(mmap);
        match self.archive.get() {
            Some(mmap) => Ok(&mmap[..]),
            None => Err(std::io::Error::other("archive mapping unavailable")),
        }
    }

    pub fn read_class(&self, class_name: &str) -> std::io::Result<Vec<u8>> {
        let entry = class_name_to_class_path(class_name);
        match self.kind {
            RootKind::Directory => std::fs::read(self.path.join(entry)),
            RootKind::Archive => {
                let mut archive =
                    ZipArchive::new(Cursor::new(self.archive_bytes()?)).map_err(zip_to_io)?;
                let mut file = archive.by_name(&entry).map_err(zip_to_io)?;
                let mut bytes = Vec::with_capacity(file.size() as usize);
                file.read_to_end(&mut bytes)?;
                Ok(bytes)
            }
        }
    }
}

impl PartialEq for RootSource {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for RootSource {}

impl Hash for RootSource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl fmt::Debug for RootSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootSource")
            .field("path", &self.path)
            .field("kind", &self.kind)
            .finish()
    }
}

pub(crate) fn zip_to_io(err: zip::result::ZipError) -> std::io::Error {
    match err {
        zip::result::ZipError::Io(io) => io,
        zip::result::ZipError::FileNotFound => {
            std::io::Error::new(std::io::ErrorKind::NotFound, "entry not found in archive")
        }
        other => std::io::Error::new(std::io::ErrorKind::InvalidData, other.to_string()),
    }
}

/// Where one class file lives: a root plus a binary class name. Two locations
/// with the same name but different roots are different locations.
#[derive(Clone)]
pub struct ClassLocation {
    root: Arc<RootSource>,
    class_name: Arc<str>,
    size: u64,
}

impl ClassLocation {
    pub fn new(root: Arc<RootSource>, class_name: &str, size: u64) -> Self {
        Self {
            root,
            class_name: Arc::from(class_name),
            size,
        }
    }

    pub fn root(&self) -> &Arc<RootSource> {
        &self.root
    }

    pub fn root_path(&self) -> &Path {
        self.root.path()
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn package_name(&self) -> &str {
        package_of(&self.class_name)
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn uri(&self) -> String {
        let entry = class_name_to_class_path(&self.class_name);
        match self.root.kind() {
            RootKind::Directory => format!("file:{}", self.root.path().join(entry).display()),
            RootKind::Archive => format!("jar:file:{}!/{entry}", self.root.path().display()),
        }
    }

    pub fn read_bytes(&self) -> std::io::Result<Vec<u8>> {
        self.root.read_class(&self.class_name)
    }
}

impl PartialEq for ClassLocation {
    fn eq(&self, other: &Self) -> bool {
        self.class_name == other.class_name && self.root == other.root
    }
}

impl Eq for ClassLocation {}

impl Hash for ClassLocation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.root.hash(state);
        self.class_name.hash(state);
    }
}

impl fmt::Debug for ClassLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassLocation({})", self.uri())
    }
}

impl fmt::Display for ClassLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri())
    }
}

impl Serialize for ClassLocation {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("ClassLocation", 4)?;
        s.serialize_field("class_name", &*self.class_name)?;
        s.serialize_field("root", &self.root.path().to_string_lossy())?;
        s.serialize_field("uri", &self.uri())?;
        s.serialize_field("size", &self.size)?;
        s.end()
    }
}

/// Package part of a binary class name; `""` for the unnamed package.
pub fn package_of(class_name: &str) -> &str {
    class_name.rsplit_once('.').map_or("", |(pkg, _)| pkg)
}

/// Parent of a package, computed from the name. The unnamed package has none.
pub fn parent_package(package: &str) -> Option<&str> {
    if package.is_empty() {
        return None;
    }
    Some(package.rsplit_once('.').map_or("", |(parent, _)| parent))
}

/// `true` when `package` is `prefix` or lies below it.
pub fn is_in_package_tree(package: &str, prefix: &str) -> bool {
    prefix.is_empty()
        || package == prefix
        || (package.len() > prefix.len()
            && package.starts_with(prefix)
            && package.as_bytes()[prefix.len()] == b'.')
}

/// Classes directly in one package of one root.
#[derive(Debug, Clone)]
pub struct ClassPackage {
    name: String,
    locations: Vec<ClassLocation>,
}

impl ClassPackage {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent_name(&self) -> Option<&str> {
        parent_package(&self.name)
    }

    pub fn locations(&self) -> &[ClassLocation] {
        &self.locations
    }
}

#[derive(Debug)]
pub struct ClassRoot {
    source: Arc<RootSource>,
    packages: BTreeMap<String, ClassPackage>,
}

impl ClassRoot {
    pub fn open(path: &Path) -> Result<Self> {
        let source = RootSource::open(path)?;
        let locations = scan::list_classes(&source)?;
        Ok(Self::from_locations(source, locations))
    }

    /// Builds a root from already known locations. Locations are grouped by
    /// package; a repeated class name within the root keeps the first entry.
    pub fn from_locations(
        source: Arc<RootSource>,
        locations: impl IntoIterator<Item = ClassLocation>,
    ) -> Self {
        let mut packages: BTreeMap<String, ClassPackage> = BTreeMap::new();
        let mut seen: HashSet<Arc<str>> = HashSet::new();
        for location in locations {
            if !seen.insert(Arc::clone(&location.class_name)) {
                continue;
            }
            let package = packages
                .entry(location.package_name().to_string())
                .or_insert_with(|| ClassPackage {
                    name: location.package_name().to_string(),
                    locations: Vec::new(),
                });
            package.locations.push(location);
        }
        for package in packages.values_mut() {
            package
                .locations
                .sort_by(|a, b| a.class_name().cmp(b.class_name()));
        }
        Self { source, packages }
    }

    pub fn source(&self) -> &Arc<RootSource> {
        &self.source
    }

    pub fn path(&self) -> &Path {
        self.source.path()
    }

    pub fn kind(&self) -> RootKind {
        self.source.kind()
    }

    pub fn packages(&self) -> impl Iterator<Item = &ClassPackage> {
        self.packages.values()
    }

    pub fn package(&self, name: &str) -> Option<&ClassPackage> {
        self.packages.get(name)
    }

    pub fn locations(&self) -> impl Iterator<Item = &ClassLocation> {
        self.packages.values().flat_map(|p| p.locations.iter())
    }

    /// Locations in `prefix` and all of its sub packages.
    pub fn locations_under<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = &'a ClassLocation> + 'a {
        self.packages
            .values()
            .filter(move |p| is_in_package_tree(&p.name, prefix))
            .flat_map(|p| p.locations.iter())
    }

    pub fn location(&self, class_name: &str) -> Option<&ClassLocation> {
        self.packages
            .get(package_of(class_name))?
            .locations
            .iter()
            .find(|l| l.class_name() == class_name)
    }

    pub fn len(&self) -> usize {
        self.packages.values().map(|p| p.locations.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
