use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::cli::Cli;
use crate::duplicates::HashAlgorithm;
use crate::scan::{scan_jars, split_class_path};

pub const HASH_ALGORITHM_ENV: &str = "CLASS_SLICE_HASH_ALGORITHM";
pub const CLASSPATH_ENV: &str = "CLASSPATH";
pub const LOG_ENV: &str = "CLASS_SLICE_LOG";

/// Duplicate scan policy. `ignore_equal_duplicates` is checked before
/// `continue_on_duplicate`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicateConfig {
    pub hash_algorithm: HashAlgorithm,
    pub ignore_equal_duplicates: bool,
    pub continue_on_duplicate: bool,
}

pub fn resolve_hash_algorithm(flag: Option<&str>) -> Result<HashAlgorithm> {
    resolve_hash_algorithm_with(flag, |key| env::var(key).ok())
}

pub fn resolve_hash_algorithm_with(
    flag: Option<&str>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<HashAlgorithm> {
    if let Some(name) = flag {
        return name
            .parse()
            .with_context(|| format!("Invalid --hash-algorithm value: {name}"));
    }
    if let Some(name) = lookup(HASH_ALGORITHM_ENV).filter(|v| !v.trim().is_empty()) {
        return name
            .parse()
            .with_context(|| format!("Invalid {HASH_ALGORITHM_ENV} value: {name}"));
    }
    Ok(HashAlgorithm::default())
}

pub fn resolve_duplicate_config(
    hash_algorithm: Option<&str>,
    ignore_equal_duplicates: bool,
    continue_on_duplicate: bool,
) -> Result<DuplicateConfig> {
    Ok(DuplicateConfig {
        hash_algorithm: resolve_hash_algorithm(hash_algorithm)?,
        ignore_equal_duplicates,
        continue_on_duplicate,
    })
}

/// Class roots in command line order: `--root`, then `--cp`, then the jars
/// below `--lib`. Falls back to `CLASSPATH` when none are given.
pub fn resolve_roots(cli: &Cli) -> Result<Vec<PathBuf>> {
    resolve_roots_with(cli, |key| env::var(key).ok())
}

pub fn resolve_roots_with(cli: &Cli, lookup: impl Fn(&str) -> Option<String>) -> Result<Vec<PathBuf>> {
    let mut roots = cli.roots.clone();
    if let Some(cp) = &cli.cp {
        roots.extend(split_class_path(cp));
    }
    if let Some(lib) = &cli.lib {
        let jars = scan_jars(lib)
            .with_context(|| format!("Failed to scan library directory: {}", lib.display()))?;
        roots.extend(jars);
    }
    if roots.is_empty()
        && let Some(cp) = lookup(CLASSPATH_ENV)
    {
        roots.extend(split_class_path(&cp));
    }
    if roots.is_empty() {
        anyhow::bail!("No class roots given. Use --root, --cp, --lib or set {CLASSPATH_ENV}");
    }

    let mut unique = Vec::with_capacity(roots.len());
    for root in roots {
        if !unique.contains(&root) {
            unique.push(root);
        }
    }
    Ok(unique)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["class-slice"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    #[test]
    fn hash_algorithm_flag_beats_environment() {
        let env = |_: &str| Some("md5".to_string());
        assert_eq!(
            resolve_hash_algorithm_with(Some("sha-1"), env).unwrap(),
            HashAlgorithm::Sha1
        );
        assert_eq!(resolve_hash_algorithm_with(None, env).unwrap(), HashAlgorithm::Md5);
        assert_eq!(
            resolve_hash_algorithm_with(None, |_| None).unwrap(),
            HashAlgorithm::Sha256
        );
        assert!(resolve_hash_algorithm_with(Some("crc"), |_| None).is_err());
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: DuplicateConfig =
            serde_json::from_str(r#"{"hash_algorithm":"sha-512","continue_on_duplicate":true}"#)
                .unwrap();
        assert_eq!(config.hash_algorithm, HashAlgorithm::Sha512);
        assert!(config.continue_on_duplicate);
        assert!(!config.ignore_equal_duplicates);
        assert_eq!(
            serde_json::to_value(DuplicateConfig::default()).unwrap()["hash_algorithm"],
            "SHA-256"
        );
    }

    #[test]
    fn roots_follow_command_line_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.jar"), b"").unwrap();
        std::fs::write(dir.path().join("a.jar"), b"").unwrap();
        let lib = dir.path().to_str().unwrap();
        let cp = env::join_paths(["/cp1", "/cp2"]).unwrap();
        let cp = cp.to_str().unwrap();

        let parsed = cli(&["--root", "/r1", "--cp", cp, "--lib", lib, "--root", "/r1", "packages"]);
        let roots = resolve_roots_with(&parsed, |_| Some("/ignored".to_string())).unwrap();
        assert_eq!(
            roots,
            vec![
                PathBuf::from("/r1"),
                PathBuf::from("/cp1"),
                PathBuf::from("/cp2"),
                dir.path().join("a.jar"),
                dir.path().join("b.jar"),
            ]
        );
    }

    #[test]
    fn classpath_environment_is_the_fallback() {
        let parsed = cli(&["packages"]);
        let roots = resolve_roots_with(&parsed, |key| {
            (key == CLASSPATH_ENV).then(|| "/from/env".to_string())
        })
        .unwrap();
        assert_eq!(roots, vec![PathBuf::from("/from/env")]);
        assert!(resolve_roots_with(&parsed, |_| None).is_err());
    }
}
