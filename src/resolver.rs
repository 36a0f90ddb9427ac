//! Name index over an ordered set of roots.
//!
//! Roots are collected with [`ClassResolverBuilder`] and frozen by `build`;
//! the resulting [`ClassResolver`] has no way to add roots. Every location is
//! kept: a name present in several roots is reported as a duplicate instead of
//! being shadowed.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;
use crate::root::{ClassLocation, ClassRoot, is_in_package_tree, package_of};

#[derive(Default)]
pub struct ClassResolverBuilder {
    roots: Vec<ClassRoot>,
}

impl ClassResolverBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an already opened root. A root whose path is already present
    /// is ignored.
    pub fn add_root(&mut self, root: ClassRoot) -> &mut Self {
        if self.roots.iter().any(|r| r.path() == root.path()) {
            tracing::debug!(root = %root.path().display(), "root already added");
            return self;
        }
        self.roots.push(root);
        self
    }

    pub fn add_path(&mut self, path: &Path) -> Result<&mut Self> {
        let root = ClassRoot::open(path)?;
        Ok(self.add_root(root))
    }

    pub fn add_paths<P: AsRef<Path>>(
        &mut self,
        paths: impl IntoIterator<Item = P>,
    ) -> Result<&mut Self> {
        for path in paths {
            self.add_path(path.as_ref())?;
        }
        Ok(self)
    }

    pub fn build(self) -> ClassResolver {
        let mut by_name: BTreeMap<String, Vec<ClassLocation>> = BTreeMap::new();
        for root in &self.roots {
            for location in root.locations() {
                by_name
                    .entry(location.class_name().to_string())
                    .or_default()
                    .push(location.clone());
            }
        }
        let resolver = ClassResolver {
            roots: self.roots,
            by_name,
        };
        tracing::debug!(
            roots = resolver.roots.len(),
            classes = resolver.by_name.len(),
            duplicates = resolver.duplicate_groups().count(),
            "class resolver built"
        );
        resolver
    }
}

pub struct ClassResolver {
    roots: Vec<ClassRoot>,
    by_name: BTreeMap<String, Vec<ClassLocation>>,
}

impl ClassResolver {
    pub fn builder() -> ClassResolverBuilder {
        ClassResolverBuilder::new()
    }

    /// Every location of `name`, in root order. Empty when the name is unknown.
    pub fn locate(&self, name: &str) -> &[ClassLocation] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Locations of all classes in `prefix` and its sub packages, in root
    /// order. The empty prefix selects everything.
    pub fn all_locations_under<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = &'a ClassLocation> + 'a {
        self.roots
            .iter()
            .flat_map(move |root| root.locations_under(prefix))
    }

    /// Names with more than one location, each with all of its locations.
    pub fn duplicate_groups(&self) -> impl Iterator<Item = (&str, &[ClassLocation])> {
        self.by_name
            .iter()
            .filter(|(_, locations)| locations.len() > 1)
            .map(|(name, locations)| (name.as_str(), locations.as_slice()))
    }

    /// All known class names, sorted.
    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }

    /// Known class names in `prefix` and its sub packages, sorted.
    pub fn class_names_under<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.by_name
            .keys()
            .filter(move |name| is_in_package_tree(package_of(name), prefix))
            .map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn roots(&self) -> &[ClassRoot] {
        &self.roots
    }

    pub fn root(&self, path: &Path) -> Option<&ClassRoot> {
        self.roots.iter().find(|r| r.path() == path)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
