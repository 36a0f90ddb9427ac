//! Root listing and traversal.
//!
//! Directories are walked with `ignore` in file name order; archives are
//! memory mapped and read in central directory order. `module-info` and
//! `package-info` are not classes and are skipped, as is everything under
//! `META-INF/`.

use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, mpsc};

use ignore::WalkBuilder;
use memmap2::Mmap;
use zip::ZipArchive;

use crate::error::{Error, Result};
use crate::root::{ClassLocation, RootKind, RootSource, zip_to_io};

/// Receives each class of a root together with a reader over its bytes.
pub trait ClassVisitor {
    fn visit(&mut self, location: &ClassLocation, content: &mut dyn Read) -> Result<()>;

    /// Called when a single class cannot be opened. The traversal continues
    /// unless this returns an error.
    fn visit_failed(&mut self, location: &ClassLocation, error: std::io::Error) -> Result<()> {
        tracing::warn!(class = location.class_name(), %location, %error, "skipping unreadable class");
        Ok(())
    }
}

pub fn class_name_to_class_path(class_name: &str) -> String {
    format!("{}.class", class_name.replace('.', "/"))
}

/// Binary class name for an entry path such as `com/a/Foo.class`.
pub fn class_path_to_class_name(entry: &str) -> Option<String> {
    let entry = entry.trim_start_matches('/');
    let stem = entry.strip_suffix(".class")?;
    if stem.is_empty() || entry.starts_with("META-INF/") {
        return None;
    }
    let simple = stem.rsplit('/').next().unwrap_or(stem);
    if simple == "module-info" || simple == "package-info" {
        return None;
    }
    Some(stem.replace('/', "."))
}

pub(crate) fn map_archive(path: &Path) -> std::io::Result<Mmap> {
    let file = File::open(path)?;
    // SAFETY: the archive is only read; concurrent truncation is not supported.
    unsafe { Mmap::map(&file) }
}

/// Lists every class of `source` without reading class bytes.
pub fn list_classes(source: &Arc<RootSource>) -> Result<Vec<ClassLocation>> {
    match source.kind() {
        RootKind::Directory => Ok(directory_classes(source)
            .into_iter()
            .map(|(name, _, size)| ClassLocation::new(Arc::clone(source), &name, size))
            .collect()),
        RootKind::Archive => {
            let bytes = source.archive_bytes().map_err(|e| root_io(source, e))?;
            let mut archive = ZipArchive::new(Cursor::new(bytes))?;
            let mut out = Vec::new();
            for i in 0..archive.len() {
                let entry = archive.by_index_raw(i)?;
                if entry.is_dir() {
                    continue;
                }
                if let Some(name) = class_path_to_class_name(entry.name()) {
                    out.push(ClassLocation::new(Arc::clone(source), &name, entry.size()));
                }
            }
            Ok(out)
        }
    }
}

/// Visits every class in the root at `path`.
pub fn traverse_root(path: &Path, visitor: &mut dyn ClassVisitor) -> Result<()> {
    let source = RootSource::open(path)?;
    traverse_source(&source, visitor)
}

pub fn traverse_source(source: &Arc<RootSource>, visitor: &mut dyn ClassVisitor) -> Result<()> {
    match source.kind() {
        RootKind::Directory => {
            for (name, file, size) in directory_classes(source) {
                let location = ClassLocation::new(Arc::clone(source), &name, size);
                match File::open(&file) {
                    Ok(mut content) => visitor.visit(&location, &mut content)?,
                    Err(err) => visitor.visit_failed(&location, err)?,
                }
            }
            Ok(())
        }
        RootKind::Archive => {
            let bytes = source.archive_bytes().map_err(|e| root_io(source, e))?;
            let mut archive = ZipArchive::new(Cursor::new(bytes))?;
            for i in 0..archive.len() {
                let (name, size) = {
                    let entry = archive.by_index_raw(i)?;
                    if entry.is_dir() {
                        continue;
                    }
                    match class_path_to_class_name(entry.name()) {
                        Some(name) => (name, entry.size()),
                        None => continue,
                    }
                };
                let location = ClassLocation::new(Arc::clone(source), &name, size);
                match archive.by_index(i) {
                    Ok(mut content) => visitor.visit(&location, &mut content)?,
                    Err(err) => visitor.visit_failed(&location, zip_to_io(err))?,
                }
            }
            Ok(())
        }
    }
}

/// Visits every root in order.
pub fn traverse_all<P: AsRef<Path>>(
    paths: impl IntoIterator<Item = P>,
    visitor: &mut dyn ClassVisitor,
) -> Result<()> {
    for path in paths {
        traverse_root(path.as_ref(), visitor)?;
    }
    Ok(())
}

/// Splits a class path string on the platform separator, dropping empty
/// elements.
pub fn split_class_path(class_path: &str) -> Vec<PathBuf> {
    std::env::split_paths(class_path)
        .filter(|p| !p.as_os_str().is_empty())
        .collect()
}

/// All jar files below `base_path`, sorted so root order is stable.
pub fn scan_jars(base_path: &Path) -> Result<Vec<PathBuf>> {
    let source = match std::fs::metadata(base_path) {
        Ok(meta) if meta.is_dir() => None,
        Ok(_) => Some(std::io::Error::new(
            std::io::ErrorKind::NotADirectory,
            "not a directory",
        )),
        Err(err) => Some(err),
    };
    if let Some(source) = source {
        return Err(Error::RootIo {
            root: base_path.to_path_buf(),
            source,
        });
    }
    let (tx, rx) = mpsc::channel();

    let walker = WalkBuilder::new(base_path)
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .build_parallel();

    walker.run(|| {
        let tx = tx.clone();
        Box::new(move |entry| {
            if let Ok(entry) = entry {
                let path = entry.path();
                if path.extension().is_some_and(|e| e == "jar") && path.is_file() {
                    let _ = tx.send(path.to_path_buf());
                }
            }
            ignore::WalkState::Continue
        })
    });

    drop(tx);
    let mut jars: Vec<PathBuf> = rx.iter().collect();
    jars.sort();
    Ok(jars)
}

fn directory_classes(source: &RootSource) -> Vec<(String, PathBuf, u64)> {
    let base = source.path();
    let walker = WalkBuilder::new(base)
        .hidden(false)
        .ignore(false)
        .parents(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    let mut out = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(root = %base.display(), %err, "skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(base) else {
            continue;
        };
        let entry_name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let Some(name) = class_path_to_class_name(&entry_name) else {
            continue;
        };
        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        out.push((name, entry.path().to_path_buf(), size));
    }
    out
}

fn root_io(root: &RootSource, source: std::io::Error) -> Error {
    Error::RootIo {
        root: root.path().to_path_buf(),
        source,
    }
}
