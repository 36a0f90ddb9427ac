use std::fmt;

use serde::Serialize;

use crate::root::ClassLocation;

/// Outcome of a failed dependency rule: every offending class with every
/// dependency that broke the rule.
#[derive(Debug, Clone, Serialize)]
pub struct ViolationReport {
    pub rule: String,
    pub violations: Vec<Violation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Violation {
    pub class_name: String,
    pub location: Option<ClassLocation>,
    pub dependencies: Vec<ViolatingDependency>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ViolatingDependency {
    pub name: String,
    pub location: Option<ClassLocation>,
}

impl ViolationReport {
    pub fn new(rule: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            violations: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn violating_classes(&self) -> impl Iterator<Item = &str> {
        self.violations.iter().map(|v| v.class_name.as_str())
    }

    /// Dependency names across all violations, without repeats.
    pub fn violating_dependencies(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .violations
            .iter()
            .flat_map(|v| v.dependencies.iter().map(|d| d.name.as_str()))
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

impl fmt::Display for ViolationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count: usize = self.violations.iter().map(|v| v.dependencies.len()).sum();
        write!(f, "{}: {count} violating dependencies", self.rule)?;
        for violation in &self.violations {
            write!(f, "\n  {}", violation.class_name)?;
            if let Some(location) = &violation.location {
                write!(f, " ({location})")?;
            }
            for dep in &violation.dependencies {
                write!(f, "\n    -> {}", dep.name)?;
                if let Some(location) = &dep.location {
                    write!(f, " ({location})")?;
                }
            }
        }
        Ok(())
    }
}
