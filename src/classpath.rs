//! The resolution context.
//!
//! A [`Classpath`] owns a frozen [`ClassResolver`] and every [`Clazz`] handle
//! created from it. Handles are created on first request and cached by name
//! for the lifetime of the context, so the same name always yields the same
//! handle. A name found in several roots gets one handle per location; the
//! first one in root order is the primary handle.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use crate::clazz::Clazz;
use crate::error::{Error, Result};
use crate::pattern::NamePattern;
use crate::resolver::ClassResolver;
use crate::root::{ClassLocation, ClassRoot};
use crate::slice::{Members, NameListSource, PatternSource, Slice, SliceGroup};

struct Handles {
    primary: Arc<Clazz>,
    /// One handle per location, primary first.
    alternatives: Vec<Arc<Clazz>>,
}

struct Inner {
    resolver: ClassResolver,
    handles: RwLock<HashMap<String, Arc<Handles>>>,
    all: OnceLock<Members>,
}

#[derive(Clone)]
pub struct Classpath {
    inner: Arc<Inner>,
}

impl Classpath {
    pub fn new(resolver: ClassResolver) -> Self {
        Self {
            inner: Arc::new(Inner {
                resolver,
                handles: RwLock::new(HashMap::new()),
                all: OnceLock::new(),
            }),
        }
    }

    /// Opens every path as a root, in order.
    pub fn open<P: AsRef<Path>>(paths: impl IntoIterator<Item = P>) -> Result<Self> {
        let mut builder = ClassResolver::builder();
        builder.add_paths(paths)?;
        Ok(Self::new(builder.build()))
    }

    pub fn resolver(&self) -> &ClassResolver {
        &self.inner.resolver
    }

    fn handles(&self, name: &str) -> Arc<Handles> {
        if let Some(handles) = self
            .inner
            .handles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return Arc::clone(handles);
        }
        let mut cache = self
            .inner
            .handles
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            cache
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(self.create_handles(name))),
        )
    }

    fn create_handles(&self, name: &str) -> Handles {
        let alternatives: Vec<Arc<Clazz>> = self
            .inner
            .resolver
            .locate(name)
            .iter()
            .map(|location| Arc::new(Clazz::new(name, Some(location.clone()))))
            .collect();
        match alternatives.first() {
            Some(primary) => Handles {
                primary: Arc::clone(primary),
                alternatives,
            },
            None => {
                let primary = Arc::new(Clazz::undefined(name));
                Handles {
                    alternatives: vec![Arc::clone(&primary)],
                    primary,
                }
            }
        }
    }

    /// The cached handle for `name`. Unknown names give an undefined handle.
    pub fn as_clazz(&self, name: &str) -> Arc<Clazz> {
        Arc::clone(&self.handles(name).primary)
    }

    /// The handle bound to one specific location.
    pub fn as_clazz_at(&self, location: &ClassLocation) -> Result<Arc<Clazz>> {
        if self.inner.resolver.root(location.root_path()).is_none() {
            return Err(Error::UnresolvedRoot(location.root_path().to_path_buf()));
        }
        self.handles(location.class_name())
            .alternatives
            .iter()
            .find(|clazz| clazz.location() == Some(location))
            .cloned()
            .ok_or_else(|| Error::ClassIo {
                root: location.root_path().to_path_buf(),
                name: location.class_name().to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "class is not part of this root",
                ),
            })
    }

    /// Every handle for the name of `clazz`, primary first.
    pub fn alternatives(&self, clazz: &Clazz) -> Vec<Arc<Clazz>> {
        self.handles(clazz.name()).alternatives.clone()
    }

    pub fn slice_of_classes(&self, clazzes: impl IntoIterator<Item = Arc<Clazz>>) -> Slice {
        Slice::concrete(self, "classes", clazzes)
    }

    /// A deferred slice of the named classes.
    pub fn slice_of<S: Into<String>>(&self, names: impl IntoIterator<Item = S>) -> Slice {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let description = names.join(", ");
        Slice::deferred(self, &description, Arc::new(NameListSource(names)))
    }

    /// A deferred slice of every class matching `pattern`.
    pub fn slice(&self, pattern: &str) -> Result<Slice> {
        let pattern = NamePattern::parse(pattern)?;
        let description = pattern.to_string();
        Ok(Slice::deferred(
            self,
            &description,
            Arc::new(PatternSource(pattern)),
        ))
    }

    /// A predicate-only slice over the whole class path.
    pub fn matching(
        &self,
        description: &str,
        predicate: impl Fn(&Clazz) -> bool + Send + Sync + 'static,
    ) -> Slice {
        Slice::derived(self, description, predicate)
    }

    /// Every class on the class path. Iterable, but refuses `combine`.
    pub fn all(&self) -> Slice {
        Slice::whole_classpath(self)
    }

    pub(crate) fn all_members(&self) -> Result<Members> {
        if let Some(members) = self.inner.all.get() {
            return Ok(Arc::clone(members));
        }
        let members = Slice::concrete(
            self,
            "classpath",
            self.inner
                .resolver
                .class_names()
                .map(|name| self.as_clazz(name)),
        )
        .materialize()?;
        Ok(Arc::clone(self.inner.all.get_or_init(|| members)))
    }

    /// One primary handle per name found in more than one root.
    pub fn duplicates(&self) -> Slice {
        Slice::concrete(
            self,
            "duplicates",
            self.inner
                .resolver
                .duplicate_groups()
                .map(|(name, _)| self.as_clazz(name)),
        )
    }

    /// Classes in `prefix` and below, split by package.
    pub fn package_tree_of(&self, prefix: &str) -> Result<SliceGroup> {
        let slice = Slice::concrete(
            self,
            prefix,
            self.inner
                .resolver
                .class_names_under(prefix)
                .map(|name| self.as_clazz(name)),
        );
        SliceGroup::package_tree(&slice, prefix)
    }

    pub fn root_of(&self, path: &Path) -> Result<Root> {
        let index = self
            .inner
            .resolver
            .roots()
            .iter()
            .position(|root| root.path() == path)
            .ok_or_else(|| Error::UnresolvedRoot(path.to_path_buf()))?;
        Ok(Root {
            classpath: self.clone(),
            index,
        })
    }

    /// The root holding the primary location of `name`.
    pub fn root_of_class(&self, name: &str) -> Option<Root> {
        let clazz = self.as_clazz(name);
        self.root_of(clazz.location()?.root_path()).ok()
    }
}

impl fmt::Debug for Classpath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Classpath")
            .field("roots", &self.inner.resolver.roots().len())
            .field("classes", &self.inner.resolver.len())
            .finish()
    }
}

/// One root of a [`Classpath`].
#[derive(Clone)]
pub struct Root {
    classpath: Classpath,
    index: usize,
}

impl Root {
    fn class_root(&self) -> &ClassRoot {
        &self.classpath.resolver().roots()[self.index]
    }

    pub fn path(&self) -> &Path {
        self.class_root().path()
    }

    /// All classes of this root, bound to this root's locations.
    pub fn slice(&self) -> Result<Slice> {
        let clazzes = self
            .class_root()
            .locations()
            .map(|location| self.classpath.as_clazz_at(location))
            .collect::<Result<Vec<_>>>()?;
        Ok(Slice::concrete(
            &self.classpath,
            &self.path().display().to_string(),
            clazzes,
        ))
    }

    pub fn package_tree(&self, prefix: &str) -> Result<SliceGroup> {
        SliceGroup::package_tree(&self.slice()?, prefix)
    }

    pub fn contains(&self, clazz: &Clazz) -> bool {
        clazz
            .location()
            .is_some_and(|location| location.root_path() == self.path())
    }
}

impl fmt::Debug for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Root({})", self.path().display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classgen::ClassGen;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, class: ClassGen, internal: &str) {
        let path = root.join(format!("{internal}.class"));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, class.build()).unwrap();
    }

    struct Fixture {
        _dir: TempDir,
        r1: std::path::PathBuf,
        r2: std::path::PathBuf,
        classpath: Classpath,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let r1 = dir.path().join("r1");
        let r2 = dir.path().join("r2");
        write(
            &r1,
            ClassGen::new("com/a/Foo").field("bar", "Lcom/b/Bar;"),
            "com/a/Foo",
        );
        write(&r1, ClassGen::new("com/b/Bar"), "com/b/Bar");
        write(&r1, ClassGen::new("com/a/sub/Deep"), "com/a/sub/Deep");
        write(
            &r2,
            ClassGen::new("com/b/Bar").field("x", "Lcom/c/Other;"),
            "com/b/Bar",
        );
        let classpath = Classpath::open([&r1, &r2]).unwrap();
        Fixture {
            _dir: dir,
            r1,
            r2,
            classpath,
        }
    }

    #[test]
    fn same_name_yields_identical_handle() {
        let f = fixture();
        let a = f.classpath.as_clazz("com.a.Foo");
        let b = f.classpath.as_clazz("com.a.Foo");
        assert!(Arc::ptr_eq(&a, &b));

        let undefined = f.classpath.as_clazz("java.lang.Object");
        assert!(undefined.is_undefined());
        assert!(Arc::ptr_eq(&undefined, &f.classpath.as_clazz("java.lang.Object")));
    }

    #[test]
    fn duplicate_handle_is_the_lookup_handle() {
        let f = fixture();
        let duplicates = f.classpath.duplicates().members().unwrap();
        assert_eq!(duplicates.len(), 1);
        let bar = f.classpath.as_clazz("com.b.Bar");
        assert!(Arc::ptr_eq(&duplicates[0], &bar));

        let alternatives = f.classpath.alternatives(&bar);
        assert_eq!(alternatives.len(), 2);
        assert!(Arc::ptr_eq(&alternatives[0], &bar));
        assert_eq!(alternatives[1].location().unwrap().root_path(), f.r2);
        // each alternative decodes its own bytes
        assert!(!bar.uses("com.c.Other").unwrap());
        assert!(alternatives[1].uses("com.c.Other").unwrap());
    }

    #[test]
    fn location_handles_require_a_registered_root() {
        let f = fixture();
        let location = f.classpath.resolver().locate("com.b.Bar")[1].clone();
        let at = f.classpath.as_clazz_at(&location).unwrap();
        assert_eq!(at.location(), Some(&location));

        let foreign = ClassLocation::new(
            crate::root::RootSource::new("/elsewhere".into(), crate::root::RootKind::Directory),
            "com.b.Bar",
            0,
        );
        assert!(matches!(
            f.classpath.as_clazz_at(&foreign),
            Err(Error::UnresolvedRoot(_))
        ));
    }

    #[test]
    fn roots_give_scoped_slices() {
        let f = fixture();
        let r2 = f.classpath.root_of(&f.r2).unwrap();
        let members = r2.slice().unwrap().members().unwrap();
        assert_eq!(members.len(), 1);
        assert!(r2.contains(&members[0]));
        assert!(!Arc::ptr_eq(&members[0], &f.classpath.as_clazz("com.b.Bar")));

        let root = f.classpath.root_of_class("com.a.Foo").unwrap();
        assert_eq!(root.path(), f.r1);
        assert!(f.classpath.root_of_class("java.lang.String").is_none());
        assert!(f.classpath.root_of(Path::new("/nowhere")).is_err());

        let tree = root.package_tree("com").unwrap();
        let names: Vec<_> = tree.package_names().collect();
        assert_eq!(names, vec!["com", "com.a", "com.a.sub", "com.b"]);
        assert!(tree.get("com").unwrap().slice().is_empty().unwrap());
    }

    #[test]
    fn package_tree_of_prefix() {
        let f = fixture();
        let tree = f.classpath.package_tree_of("com.a").unwrap();
        let names: Vec<_> = tree.package_names().collect();
        assert_eq!(names, vec!["com.a", "com.a.sub"]);
        let all = tree.tree_slice("com.a").unwrap();
        assert_eq!(all.names().unwrap(), vec!["com.a.Foo", "com.a.sub.Deep"]);
        let deep = tree.get("com.a.sub").unwrap();
        assert_eq!(deep.parent_package(&tree).unwrap().name(), "com.a");
        let top = tree.get("com.a").unwrap().parent_package(&tree).unwrap();
        assert_eq!(top.name(), "com");
        assert!(top.slice().is_empty().unwrap());
    }
}
