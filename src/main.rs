use anyhow::{Context, Result};
use clap::Parser;
use class_slice::classfile::ClassRecord;
use class_slice::classpath::Classpath;
use class_slice::cli::{Cli, Commands, OutputFormat};
use class_slice::config::{LOG_ENV, resolve_duplicate_config, resolve_roots};
use class_slice::duplicates::{DuplicateGroup, find_duplicates};
use class_slice::report::ViolationReport;
use serde::Serialize;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let roots = resolve_roots(&cli)?;

    match cli.command.clone() {
        Commands::Duplicates {
            hash_algorithm,
            ignore_equal_duplicates,
            continue_on_duplicate,
        } => {
            let config = resolve_duplicate_config(
                hash_algorithm.as_deref(),
                ignore_equal_duplicates,
                continue_on_duplicate,
            )?;
            let start = Instant::now();
            let (finder, outcome) = find_duplicates(&roots, config);
            let output = DuplicatesOutput {
                hash_algorithm: finder.config().hash_algorithm.to_string(),
                roots: roots.iter().map(|r| r.display().to_string()).collect(),
                visited: finder.visited(),
                duration_ms: start.elapsed().as_millis() as u64,
                aborted: outcome.as_ref().err().map(ToString::to_string),
                groups: finder.duplicate_groups(),
            };
            write_output(&output, cli.format, render_duplicates)?;
            outcome.context("Duplicate scan aborted")?;
        }
        Commands::Dump { class_name } => {
            let classpath = open_classpath(&roots)?;
            let output = dump_class(&classpath, &normalize_class_name(&class_name))?;
            write_output(&output, cli.format, render_dump)?;
        }
        Commands::Deps { pattern } => {
            let classpath = open_classpath(&roots)?;
            let slice = classpath.slice(&pattern)?;
            let output = DepsOutput {
                pattern,
                classes: slice.names()?,
                dependencies: slice.dependency_names()?.into_iter().collect(),
            };
            write_output(&output, cli.format, render_deps)?;
        }
        Commands::Check {
            pattern,
            must_not_use,
        } => {
            let classpath = open_classpath(&roots)?;
            let slice = classpath.slice(&pattern)?;
            let mut reports = Vec::new();
            for rule in &must_not_use {
                let used = classpath.slice(rule)?;
                let report = slice.violations(&used)?;
                if !report.is_empty() {
                    reports.push(report);
                }
            }
            let output = CheckOutput {
                pattern,
                rules: must_not_use,
                passed: reports.is_empty(),
                violations: reports,
            };
            write_output(&output, cli.format, render_check)?;
            if !output.passed {
                anyhow::bail!("{} dependency rule(s) violated", output.violations.len());
            }
        }
        Commands::Packages { prefix } => {
            let classpath = open_classpath(&roots)?;
            let prefix = prefix.unwrap_or_default();
            let tree = classpath.package_tree_of(&prefix)?;
            let mut packages = Vec::with_capacity(tree.len());
            for part in tree.parts() {
                packages.push(PackageCount {
                    name: part.name().to_string(),
                    classes: part.slice().len()?,
                });
            }
            let output = PackagesOutput { prefix, packages };
            write_output(&output, cli.format, render_packages)?;
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn open_classpath(roots: &[PathBuf]) -> Result<Classpath> {
    Classpath::open(roots).context("Failed to open class roots")
}

fn normalize_class_name(raw: &str) -> String {
    let mut s = raw.trim();
    if let Some(rest) = s.strip_prefix("import ") {
        s = rest.trim();
    }
    s = s.trim_end_matches(';').trim();
    s = s.strip_suffix(".class").unwrap_or(s);
    s.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == '/' { '.' } else { c })
        .collect()
}

#[derive(Debug, Serialize)]
struct DuplicatesOutput {
    hash_algorithm: String,
    roots: Vec<String>,
    visited: usize,
    duration_ms: u64,
    aborted: Option<String>,
    groups: Vec<DuplicateGroup>,
}

#[derive(Debug, Serialize)]
struct MemberOutput {
    access_flags: u16,
    name: String,
    descriptor: String,
    signature: Option<String>,
}

#[derive(Debug, Serialize)]
struct DumpOutput {
    class_name: String,
    location: String,
    alternatives: Vec<String>,
    major_version: u16,
    minor_version: u16,
    access_flags: u16,
    flags: Vec<&'static str>,
    super_class: Option<String>,
    interfaces: Vec<String>,
    fields: Vec<MemberOutput>,
    methods: Vec<MemberOutput>,
    dependencies: Vec<String>,
    constant_pool: Vec<String>,
}

#[derive(Debug, Serialize)]
struct DepsOutput {
    pattern: String,
    classes: Vec<String>,
    dependencies: Vec<String>,
}

#[derive(Debug, Serialize)]
struct CheckOutput {
    pattern: String,
    rules: Vec<String>,
    passed: bool,
    violations: Vec<ViolationReport>,
}

#[derive(Debug, Serialize)]
struct PackageCount {
    name: String,
    classes: usize,
}

#[derive(Debug, Serialize)]
struct PackagesOutput {
    prefix: String,
    packages: Vec<PackageCount>,
}

fn dump_class(classpath: &Classpath, class_name: &str) -> Result<DumpOutput> {
    let clazz = classpath.as_clazz(class_name);
    let location = clazz
        .location()
        .with_context(|| format!("Class not found on the class path: {class_name}"))?;
    let record: &ClassRecord = clazz
        .class_record()?
        .with_context(|| format!("Class not found on the class path: {class_name}"))?;
    let members = |items: Vec<(u16, &str, &str, Option<&str>)>| {
        items
            .into_iter()
            .map(|(access_flags, name, descriptor, signature)| MemberOutput {
                access_flags,
                name: name.to_string(),
                descriptor: descriptor.to_string(),
                signature: signature.map(str::to_string),
            })
            .collect::<Vec<_>>()
    };

    Ok(DumpOutput {
        class_name: record.this_class.clone(),
        location: location.uri(),
        alternatives: classpath
            .alternatives(&clazz)
            .iter()
            .filter_map(|alt| alt.location().map(|l| l.uri()))
            .collect(),
        major_version: record.major_version,
        minor_version: record.minor_version,
        access_flags: record.access_flags,
        flags: record.flag_names(),
        super_class: record.super_class.clone(),
        interfaces: record.interfaces.clone(),
        fields: members(
            record
                .fields
                .iter()
                .map(|f| (f.access_flags, f.name.as_str(), f.descriptor.as_str(), f.signature.as_deref()))
                .collect(),
        ),
        methods: members(
            record
                .methods
                .iter()
                .map(|m| (m.access_flags, m.name.as_str(), m.descriptor.as_str(), m.signature.as_deref()))
                .collect(),
        ),
        dependencies: clazz.dependency_names()?.iter().cloned().collect(),
        constant_pool: record
            .dump_constant_pool()
            .lines()
            .map(str::to_string)
            .collect(),
    })
}

fn write_output<T: Serialize>(value: &T, format: OutputFormat, render: fn(&T) -> String) -> Result<()> {
    let content = match format {
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
        OutputFormat::Text => render(value),
    };
    print!("{content}");
    if !content.ends_with('\n') {
        println!();
    }
    Ok(())
}

fn render_duplicates(output: &DuplicatesOutput) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "hash_algorithm: {}", output.hash_algorithm);
    let _ = writeln!(out, "visited: {}", output.visited);
    let _ = writeln!(out, "duplicates: {}", output.groups.len());
    for group in &output.groups {
        let kind = if group.is_identical() { "identical" } else { "divergent" };
        let _ = writeln!(out, "- {} ({kind})", group.class_name);
        for entry in &group.entries {
            let _ = writeln!(out, "    {} {}", &entry.digest, entry.location);
        }
    }
    if let Some(reason) = &output.aborted {
        let _ = writeln!(out, "aborted: {reason}");
    }
    out
}

fn render_dump(output: &DumpOutput) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "class: {}", output.class_name);
    let _ = writeln!(out, "location: {}", output.location);
    let _ = writeln!(out, "version: {}.{}", output.major_version, output.minor_version);
    let _ = writeln!(out, "access: 0x{:04x} {}", output.access_flags, output.flags.join(" "));
    let _ = writeln!(out, "super: {}", output.super_class.as_deref().unwrap_or("-"));
    for interface in &output.interfaces {
        let _ = writeln!(out, "implements: {interface}");
    }
    for field in &output.fields {
        let _ = writeln!(out, "field: {} {}", field.name, field.descriptor);
    }
    for method in &output.methods {
        let _ = writeln!(out, "method: {}{}", method.name, method.descriptor);
    }
    for dep in &output.dependencies {
        let _ = writeln!(out, "uses: {dep}");
    }
    let _ = writeln!(out, "constant pool:");
    for line in &output.constant_pool {
        let _ = writeln!(out, "{line}");
    }
    out
}

fn render_deps(output: &DepsOutput) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}: {} classes", output.pattern, output.classes.len());
    for dep in &output.dependencies {
        let _ = writeln!(out, "{dep}");
    }
    out
}

fn render_check(output: &CheckOutput) -> String {
    if output.passed {
        return format!("{}: {} rule(s) hold\n", output.pattern, output.rules.len());
    }
    let mut out = String::new();
    for report in &output.violations {
        let _ = writeln!(out, "{report}");
    }
    out
}

fn render_packages(output: &PackagesOutput) -> String {
    let mut out = String::new();
    for package in &output.packages {
        let name = if package.name.is_empty() { "<default>" } else { &package.name };
        let _ = writeln!(out, "{name}: {}", package.classes);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_class_name_accepts_imports_and_paths() {
        assert_eq!(
            normalize_class_name("import org.example. Component ;"),
            "org.example.Component"
        );
        assert_eq!(normalize_class_name("org/example/Component.class"), "org.example.Component");
        assert_eq!(normalize_class_name("Foo$Bar"), "Foo$Bar");
    }
}
