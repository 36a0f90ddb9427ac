#![allow(dead_code)]

pub mod classgen;

use std::io::Write;
use std::path::Path;

use classgen::ClassGen;
use zip::write::FileOptions;

/// Writes `class` below `root` at the path of its internal name.
pub fn write_class(root: &Path, internal: &str, class: &ClassGen) -> anyhow::Result<()> {
    write_bytes(root, internal, &class.build())
}

pub fn write_bytes(root: &Path, internal: &str, bytes: &[u8]) -> anyhow::Result<()> {
    let path = root.join(format!("{internal}.class"));
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    Ok(())
}

pub fn write_jar(path: &Path, entries: &[(String, Vec<u8>)]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    let mut zip = zip::ZipWriter::new(file);
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for (name, content) in entries {
        zip.start_file(name.as_str(), options)?;
        zip.write_all(content)?;
    }
    zip.finish()?;
    Ok(())
}

/// Jar entry for `class` under its internal name.
pub fn jar_entry(internal: &str, class: &ClassGen) -> (String, Vec<u8>) {
    (format!("{internal}.class"), class.build())
}
