//! Slices: immutable sets of class handles used for dependency rules.
//!
//! A slice is either concrete (members known), derived (a predicate only),
//! deferred (a [`ClazzSource`] consulted on first materialization, then
//! cached) or the unbounded class path slice. Membership is by class name.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::classpath::Classpath;
use crate::clazz::Clazz;
use crate::error::{Error, Result};
use crate::pattern::NamePattern;
use crate::report::{ViolatingDependency, Violation, ViolationReport};
use crate::root::{is_in_package_tree, parent_package};

pub type Predicate = Arc<dyn Fn(&Clazz) -> bool + Send + Sync>;

/// Materialized members keyed by class name.
pub type Members = Arc<BTreeMap<String, Arc<Clazz>>>;

/// Supplies the members of a deferred slice.
pub trait ClazzSource: Send + Sync {
    fn resolve(&self, classpath: &Classpath) -> Result<Vec<Arc<Clazz>>>;
}

/// Every known class whose name matches a pattern.
pub struct PatternSource(pub NamePattern);

impl ClazzSource for PatternSource {
    fn resolve(&self, classpath: &Classpath) -> Result<Vec<Arc<Clazz>>> {
        let prefix = self.0.literal_package_prefix();
        Ok(classpath
            .resolver()
            .class_names_under(&prefix)
            .filter(|name| self.0.matches(name))
            .map(|name| classpath.as_clazz(name))
            .collect())
    }
}

/// A fixed list of names. Names without a location become undefined handles.
pub struct NameListSource(pub Vec<String>);

impl ClazzSource for NameListSource {
    fn resolve(&self, classpath: &Classpath) -> Result<Vec<Arc<Clazz>>> {
        Ok(self.0.iter().map(|name| classpath.as_clazz(name)).collect())
    }
}

pub struct AllClasses;

impl ClazzSource for AllClasses {
    fn resolve(&self, classpath: &Classpath) -> Result<Vec<Arc<Clazz>>> {
        Ok(classpath.all_members()?.values().cloned().collect())
    }
}

struct Deferred {
    source: Arc<dyn ClazzSource>,
    filter: Option<Predicate>,
    members: OnceLock<Members>,
}

impl Deferred {
    fn materialize(&self, classpath: &Classpath, description: &str) -> Result<Members> {
        if let Some(members) = self.members.get() {
            return Ok(Arc::clone(members));
        }
        let resolved = self.source.resolve(classpath)?;
        let members = collect_members(
            resolved
                .into_iter()
                .filter(|c| self.filter.as_ref().is_none_or(|keep| keep(c))),
        );
        tracing::debug!(slice = description, members = members.len(), "slice materialized");
        Ok(Arc::clone(self.members.get_or_init(|| members)))
    }
}

#[derive(Clone)]
enum Repr {
    Concrete(Members),
    Derived(Predicate),
    Deferred(Arc<Deferred>),
    Classpath,
}

#[derive(Clone)]
pub struct Slice {
    classpath: Classpath,
    description: Arc<str>,
    repr: Repr,
}

fn collect_members(clazzes: impl IntoIterator<Item = Arc<Clazz>>) -> Members {
    let mut members = BTreeMap::new();
    for clazz in clazzes {
        members
            .entry(clazz.name().to_string())
            .or_insert(clazz);
    }
    Arc::new(members)
}

impl Slice {
    /// A slice with known members. The first handle for a name is kept.
    pub fn concrete(
        classpath: &Classpath,
        description: &str,
        clazzes: impl IntoIterator<Item = Arc<Clazz>>,
    ) -> Self {
        Self::with_repr(classpath, description, Repr::Concrete(collect_members(clazzes)))
    }

    /// A predicate-only slice. It answers `contains` but cannot be iterated.
    pub fn derived(
        classpath: &Classpath,
        description: &str,
        predicate: impl Fn(&Clazz) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self::with_repr(classpath, description, Repr::Derived(Arc::new(predicate)))
    }

    pub fn deferred(
        classpath: &Classpath,
        description: &str,
        source: Arc<dyn ClazzSource>,
    ) -> Self {
        Self::with_repr(
            classpath,
            description,
            Repr::Deferred(Arc::new(Deferred {
                source,
                filter: None,
                members: OnceLock::new(),
            })),
        )
    }

    pub(crate) fn whole_classpath(classpath: &Classpath) -> Self {
        Self::with_repr(classpath, "classpath", Repr::Classpath)
    }

    fn with_repr(classpath: &Classpath, description: &str, repr: Repr) -> Self {
        Self {
            classpath: classpath.clone(),
            description: Arc::from(description),
            repr,
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn classpath(&self) -> &Classpath {
        &self.classpath
    }

    /// `true` while the members of a deferred slice have not been resolved.
    pub fn is_deferred(&self) -> bool {
        match &self.repr {
            Repr::Deferred(d) => d.members.get().is_none(),
            _ => false,
        }
    }

    /// Resolves the members. Idempotent: a deferred slice resolves once and
    /// returns the cached set afterwards.
    pub fn materialize(&self) -> Result<Members> {
        match &self.repr {
            Repr::Concrete(members) => Ok(Arc::clone(members)),
            Repr::Derived(_) => Err(Error::NotIterable(self.description.to_string())),
            Repr::Deferred(deferred) => deferred.materialize(&self.classpath, &self.description),
            Repr::Classpath => self.classpath.all_members(),
        }
    }

    /// Members sorted by name.
    pub fn members(&self) -> Result<Vec<Arc<Clazz>>> {
        Ok(self.materialize()?.values().cloned().collect())
    }

    pub fn names(&self) -> Result<Vec<String>> {
        Ok(self.materialize()?.keys().cloned().collect())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.materialize()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn contains(&self, clazz: &Clazz) -> Result<bool> {
        match &self.repr {
            Repr::Derived(predicate) => Ok(predicate(clazz)),
            _ => self.contains_name(clazz.name()),
        }
    }

    pub fn contains_name(&self, name: &str) -> Result<bool> {
        match &self.repr {
            Repr::Concrete(members) => Ok(members.contains_key(name)),
            Repr::Derived(predicate) => Ok(predicate(&self.classpath.as_clazz(name))),
            Repr::Deferred(deferred) => Ok(deferred
                .materialize(&self.classpath, &self.description)?
                .contains_key(name)),
            Repr::Classpath => Ok(self.classpath.resolver().contains(name)),
        }
    }

    /// Union of both slices as a concrete slice. On a name present in both,
    /// the handle of `self` is kept.
    pub fn combine(&self, other: &Slice) -> Result<Slice> {
        if matches!(self.repr, Repr::Classpath) || matches!(other.repr, Repr::Classpath) {
            return Err(Error::Unsupported("combining the class path slice"));
        }
        let mut members = (*self.materialize()?).clone();
        for (name, clazz) in other.materialize()?.iter() {
            members
                .entry(name.clone())
                .or_insert_with(|| Arc::clone(clazz));
        }
        Ok(Self::with_repr(
            &self.classpath,
            &format!("{} + {}", self.description, other.description),
            Repr::Concrete(Arc::new(members)),
        ))
    }

    /// Narrows the slice. A deferred slice stays deferred; the predicate runs
    /// once, when it is materialized.
    pub fn filter(&self, predicate: impl Fn(&Clazz) -> bool + Send + Sync + 'static) -> Slice {
        let predicate: Predicate = Arc::new(predicate);
        let description = format!("{} (filtered)", self.description);
        let deferred = |source: Arc<dyn ClazzSource>, filter: Option<Predicate>| {
            Repr::Deferred(Arc::new(Deferred {
                source,
                filter,
                members: OnceLock::new(),
            }))
        };
        let repr = match &self.repr {
            Repr::Concrete(members) => Repr::Concrete(collect_members(
                members.values().filter(|c| predicate(c)).cloned(),
            )),
            Repr::Derived(existing) => {
                let existing = Arc::clone(existing);
                Repr::Derived(Arc::new(move |c: &Clazz| existing(c) && predicate(c)))
            }
            Repr::Deferred(d) => {
                let filter: Predicate = match &d.filter {
                    Some(existing) => {
                        let existing = Arc::clone(existing);
                        Arc::new(move |c: &Clazz| existing(c) && predicate(c))
                    }
                    None => predicate,
                };
                deferred(Arc::clone(&d.source), Some(filter))
            }
            Repr::Classpath => deferred(Arc::new(AllClasses), Some(predicate)),
        };
        Self::with_repr(&self.classpath, &description, repr)
    }

    /// Union of the dependency names of all members.
    pub fn dependency_names(&self) -> Result<BTreeSet<String>> {
        let mut names = BTreeSet::new();
        for clazz in self.materialize()?.values() {
            names.extend(clazz.dependency_names()?.iter().cloned());
        }
        Ok(names)
    }

    /// The classes the members depend on, as a slice of (possibly undefined)
    /// handles.
    pub fn dependencies(&self) -> Result<Slice> {
        let names = self.dependency_names()?;
        Ok(Self::concrete(
            &self.classpath,
            &format!("dependencies of {}", self.description),
            names.iter().map(|name| self.classpath.as_clazz(name)),
        ))
    }

    pub fn is_using(&self, other: &Slice) -> Result<bool> {
        for clazz in self.materialize()?.values() {
            for dep in clazz.dependency_names()? {
                if other.contains_name(dep)? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Every member dependency that lies in `other`, grouped by member.
    pub fn violations(&self, other: &Slice) -> Result<ViolationReport> {
        let mut report = ViolationReport::new(format!(
            "{} must not use {}",
            self.description, other.description
        ));
        for clazz in self.materialize()?.values() {
            let mut dependencies = Vec::new();
            for dep in clazz.dependency_names()? {
                if other.contains_name(dep)? {
                    dependencies.push(ViolatingDependency {
                        name: dep.clone(),
                        location: self.classpath.as_clazz(dep).location().cloned(),
                    });
                }
            }
            if !dependencies.is_empty() {
                report.violations.push(Violation {
                    class_name: clazz.name().to_string(),
                    location: clazz.location().cloned(),
                    dependencies,
                });
            }
        }
        Ok(report)
    }

    /// Fails with [`Error::AssertionViolation`] naming every offending
    /// dependency when any member uses a class of `other`.
    pub fn assert_does_not_use(&self, other: &Slice) -> Result<()> {
        let report = self.violations(other)?;
        if report.is_empty() {
            return Ok(());
        }
        tracing::debug!(rule = %report.rule, violations = report.violations.len(), "rule violated");
        Err(Error::AssertionViolation(Box::new(report)))
    }

    pub fn partition_by_package(&self) -> Result<SliceGroup> {
        SliceGroup::partition(self)
    }
}

impl fmt::Debug for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.repr {
            Repr::Concrete(m) => format!("concrete, {} members", m.len()),
            Repr::Derived(_) => "derived".to_string(),
            Repr::Deferred(d) => match d.members.get() {
                Some(m) => format!("deferred, {} members", m.len()),
                None => "deferred".to_string(),
            },
            Repr::Classpath => "classpath".to_string(),
        };
        write!(f, "Slice({}: {kind})", self.description)
    }
}

impl fmt::Display for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

/// The classes of one package.
#[derive(Debug, Clone)]
pub struct PackageSlice {
    package: String,
    slice: Slice,
}

impl PackageSlice {
    fn new(classpath: &Classpath, package: &str, clazzes: Vec<Arc<Clazz>>) -> Self {
        let description = if package.is_empty() {
            "*".to_string()
        } else {
            format!("{package}.*")
        };
        Self {
            package: package.to_string(),
            slice: Slice::concrete(classpath, &description, clazzes),
        }
    }

    pub fn name(&self) -> &str {
        &self.package
    }

    pub fn slice(&self) -> &Slice {
        &self.slice
    }

    pub fn parent_package_name(&self) -> Option<&str> {
        parent_package(&self.package)
    }

    /// The parent package within `group`; an empty package slice when the
    /// parent has no classes of its own.
    pub fn parent_package(&self, group: &SliceGroup) -> Option<PackageSlice> {
        let parent = self.parent_package_name()?;
        Some(
            group
                .get(parent)
                .cloned()
                .unwrap_or_else(|| PackageSlice::new(&group.classpath, parent, Vec::new())),
        )
    }
}

/// A slice split into packages.
#[derive(Debug, Clone)]
pub struct SliceGroup {
    classpath: Classpath,
    parts: BTreeMap<String, PackageSlice>,
}

impl SliceGroup {
    pub fn partition(slice: &Slice) -> Result<Self> {
        let mut by_package: BTreeMap<String, Vec<Arc<Clazz>>> = BTreeMap::new();
        for clazz in slice.materialize()?.values() {
            by_package
                .entry(clazz.package_name().to_string())
                .or_default()
                .push(Arc::clone(clazz));
        }
        let classpath = slice.classpath().clone();
        let parts = by_package
            .into_iter()
            .map(|(package, clazzes)| {
                let part = PackageSlice::new(&classpath, &package, clazzes);
                (package, part)
            })
            .collect();
        Ok(Self { classpath, parts })
    }

    /// Partition of the members under `prefix`, with an (empty) entry for
    /// every intermediate package down from `prefix`.
    pub fn package_tree(slice: &Slice, prefix: &str) -> Result<Self> {
        let mut group = Self::partition(slice)?;
        group
            .parts
            .retain(|package, _| is_in_package_tree(package, prefix));
        let packages: Vec<String> = group.parts.keys().cloned().collect();
        for package in packages {
            let mut current = parent_package(&package);
            while let Some(parent) = current {
                if !is_in_package_tree(parent, prefix) || group.parts.contains_key(parent) {
                    break;
                }
                group.parts.insert(
                    parent.to_string(),
                    PackageSlice::new(&group.classpath, parent, Vec::new()),
                );
                current = parent_package(parent);
            }
        }
        Ok(group)
    }

    pub fn get(&self, package: &str) -> Option<&PackageSlice> {
        self.parts.get(package)
    }

    pub fn parts(&self) -> impl Iterator<Item = &PackageSlice> {
        self.parts.values()
    }

    pub fn package_names(&self) -> impl Iterator<Item = &str> {
        self.parts.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Aggregate slice of `prefix` and all of its sub packages.
    pub fn tree_slice(&self, prefix: &str) -> Result<Slice> {
        let mut clazzes = Vec::new();
        for part in self
            .parts
            .values()
            .filter(|p| is_in_package_tree(&p.package, prefix))
        {
            clazzes.extend(part.slice.members()?);
        }
        let description = if prefix.is_empty() {
            "..*".to_string()
        } else {
            format!("{prefix}..*")
        };
        Ok(Slice::concrete(&self.classpath, &description, clazzes))
    }
}
