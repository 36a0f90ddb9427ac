//! Class name patterns.
//!
//! A pattern is a dotted name whose segments may contain `*` (any run of
//! characters within one segment). An empty segment, written `..`, matches any
//! number of package levels:
//!
//! - `com.a.*` selects the classes directly in `com.a`
//! - `com.a..*` selects everything below `com.a`
//! - `..*Test` selects every class whose simple name ends with `Test`

use std::fmt;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Glob(String),
    AnyPackages,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamePattern {
    source: String,
    segments: Vec<Segment>,
}

impl NamePattern {
    pub fn parse(pattern: &str) -> Result<Self> {
        let invalid = |reason| Error::InvalidPattern {
            pattern: pattern.to_string(),
            reason,
        };
        if pattern.is_empty() {
            return Err(invalid("empty pattern"));
        }
        if pattern.ends_with('.') {
            return Err(invalid("pattern must end with a class name"));
        }
        if pattern
            .chars()
            .any(|c| !(c.is_alphanumeric() || matches!(c, '.' | '*' | '$' | '_')))
        {
            return Err(invalid("only identifier characters, '.', '*' and '$' are allowed"));
        }

        let mut segments = Vec::new();
        for part in pattern.split('.') {
            if part.is_empty() {
                if segments.last() != Some(&Segment::AnyPackages) {
                    segments.push(Segment::AnyPackages);
                }
            } else if part.contains('*') {
                segments.push(Segment::Glob(part.to_string()));
            } else {
                segments.push(Segment::Literal(part.to_string()));
            }
        }
        Ok(Self {
            source: pattern.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, class_name: &str) -> bool {
        let parts: Vec<&str> = class_name.split('.').collect();
        match_segments(&self.segments, &parts)
    }

    /// The longest package every match lies in, for narrowing lookups.
    /// `com.a..*Test` gives `com.a`; `*.Foo` gives the empty string.
    pub fn literal_package_prefix(&self) -> String {
        let package_segments = &self.segments[..self.segments.len().saturating_sub(1)];
        package_segments
            .iter()
            .map_while(|s| match s {
                Segment::Literal(text) => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn match_segments(segments: &[Segment], parts: &[&str]) -> bool {
    match (segments.split_first(), parts.split_first()) {
        (None, _) => parts.is_empty(),
        (Some((Segment::AnyPackages, rest)), _) => {
            (0..=parts.len()).any(|skip| match_segments(rest, &parts[skip..]))
        }
        (Some(_), None) => false,
        (Some((Segment::Literal(text), rest)), Some((part, remaining))) => {
            text.as_str() == *part && match_segments(rest, remaining)
        }
        (Some((Segment::Glob(glob), rest)), Some((part, remaining))) => {
            glob_match(glob.as_bytes(), part.as_bytes()) && match_segments(rest, remaining)
        }
    }
}

fn glob_match(glob: &[u8], text: &[u8]) -> bool {
    let (mut g, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while t < text.len() {
        if g < glob.len() && glob[g] == b'*' {
            star = Some((g, t));
            g += 1;
        } else if g < glob.len() && glob[g] == text[t] {
            g += 1;
            t += 1;
        } else if let Some((sg, st)) = star {
            g = sg + 1;
            t = st + 1;
            star = Some((sg, st + 1));
        } else {
            return false;
        }
    }
    glob[g..].iter().all(|&b| b == b'*')
}
