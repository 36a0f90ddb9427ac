//! Flyweight class handles.
//!
//! A [`Clazz`] is created once per class name and location by a
//! [`Classpath`](crate::classpath::Classpath) and shared from there. The record
//! is decoded on first use and memoized together with the dependency set;
//! concurrent callers block on the first decode and see the same result.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use crate::classfile::ClassRecord;
use crate::error::{DecodeError, DecodeFailure};
use crate::root::{ClassLocation, package_of};

type Decoded<T> = Result<T, DecodeError>;

pub struct Clazz {
    name: String,
    location: Option<ClassLocation>,
    record: OnceLock<Decoded<ClassRecord>>,
    dependencies: OnceLock<Decoded<BTreeSet<String>>>,
}

impl Clazz {
    pub(crate) fn new(name: &str, location: Option<ClassLocation>) -> Self {
        Self {
            name: name.to_string(),
            location,
            record: OnceLock::new(),
            dependencies: OnceLock::new(),
        }
    }

    /// A handle for a name without any location, such as a platform class.
    pub fn undefined(name: &str) -> Self {
        Self::new(name, None)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn simple_name(&self) -> &str {
        self.name.rsplit_once('.').map_or(&self.name, |(_, simple)| simple)
    }

    pub fn package_name(&self) -> &str {
        package_of(&self.name)
    }

    pub fn location(&self) -> Option<&ClassLocation> {
        self.location.as_ref()
    }

    pub fn is_undefined(&self) -> bool {
        self.location.is_none()
    }

    /// The decoded record; `Ok(None)` for undefined handles.
    pub fn class_record(&self) -> Result<Option<&ClassRecord>, DecodeError> {
        let Some(location) = &self.location else {
            return Ok(None);
        };
        match self.record.get_or_init(|| decode(location)) {
            Ok(record) => Ok(Some(record)),
            Err(err) => Err(err.clone()),
        }
    }

    /// Binary names of all classes this class refers to; empty for undefined
    /// handles.
    pub fn dependency_names(&self) -> Result<&BTreeSet<String>, DecodeError> {
        let deps = self.dependencies.get_or_init(|| {
            let (Some(record), Some(location)) = (self.class_record()?, &self.location) else {
                return Ok(BTreeSet::new());
            };
            record.dependent_classes().map_err(|err| {
                tracing::warn!(%location, %err, "cannot extract dependencies");
                DecodeError {
                    location: location.clone(),
                    failure: err.into(),
                }
            })
        });
        deps.as_ref().map_err(Clone::clone)
    }

    pub fn uses(&self, name: &str) -> Result<bool, DecodeError> {
        Ok(self.dependency_names()?.contains(name))
    }

    pub fn super_class_name(&self) -> Result<Option<&str>, DecodeError> {
        Ok(self
            .class_record()?
            .and_then(|record| record.super_class.as_deref()))
    }
}

fn decode(location: &ClassLocation) -> Decoded<ClassRecord> {
    tracing::trace!(%location, "decoding class");
    let result = location
        .read_bytes()
        .map_err(|err| DecodeFailure::Io(Arc::new(err)))
        .and_then(|bytes| ClassRecord::parse(&bytes).map_err(DecodeFailure::from));
    result.map_err(|failure| {
        tracing::warn!(%location, %failure, "cannot decode class");
        DecodeError {
            location: location.clone(),
            failure,
        }
    })
}

impl PartialEq for Clazz {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Clazz {}

impl Hash for Clazz {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl PartialOrd for Clazz {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Clazz {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}

impl fmt::Debug for Clazz {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "Clazz({} @ {location})", self.name),
            None => write!(f, "Clazz({} undefined)", self.name),
        }
    }
}

impl fmt::Display for Clazz {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
