//! Type extraction from descriptors and generic signatures.
//!
//! Field and method descriptors are a subset of the signature grammar, so a
//! single parser handles both. Only referenced class names are collected;
//! primitives and type variables are dropped and arrays are unwrapped to
//! their element type.

use std::collections::BTreeSet;

use crate::error::ClassFileError;

type Result<T> = std::result::Result<T, ClassFileError>;

/// JVMS 4.3.2: an array type may have at most 255 dimensions.
pub const MAX_ARRAY_DIMENSIONS: usize = 255;

/// Bound on `<...>` nesting in signatures. The grammar allows any depth;
/// real signatures stay in single digits.
pub const MAX_TYPE_ARGUMENT_DEPTH: usize = 64;

/// Collects the internal names of all classes referenced by a field
/// descriptor, method descriptor, or class/field/method signature.
pub fn collect_referenced_types(input: &str, out: &mut BTreeSet<String>) -> Result<()> {
    let mut parser = SignatureParser {
        input,
        pos: 0,
        depth: 0,
        out,
    };
    parser.parse_top_level()
}

/// Element class of a `Class` constant, which may name an array type
/// (`[[Ljava/lang/String;`, `[I`). `None` for arrays of primitives.
pub fn class_constant_element(name: &str) -> Result<Option<String>> {
    if !name.starts_with('[') {
        return Ok(Some(name.to_string()));
    }
    let mut found = BTreeSet::new();
    collect_referenced_types(name, &mut found)?;
    Ok(found.into_iter().next())
}

pub fn internal_to_binary(internal: &str) -> String {
    internal.replace('/', ".")
}

struct SignatureParser<'a, 'o> {
    input: &'a str,
    pos: usize,
    depth: usize,
    out: &'o mut BTreeSet<String>,
}

impl<'a> SignatureParser<'a, '_> {
    fn parse_top_level(&mut self) -> Result<()> {
        if self.input.is_empty() {
            return Err(self.invalid());
        }
        if self.peek() == Some(b'<') {
            self.parse_type_parameters()?;
        }
        if self.peek() == Some(b'(') {
            return self.parse_method();
        }
        while self.peek().is_some() {
            self.parse_java_type()?;
        }
        Ok(())
    }

    fn parse_method(&mut self) -> Result<()> {
        self.expect(b'(')?;
        while self.peek() != Some(b')') {
            if self.peek().is_none() {
                return Err(self.invalid());
            }
            self.parse_java_type()?;
        }
        self.expect(b')')?;

        if self.peek() == Some(b'V') {
            self.pos += 1;
        } else {
            self.parse_java_type()?;
        }

        while self.peek() == Some(b'^') {
            self.pos += 1;
            self.parse_reference_type()?;
        }

        if self.peek().is_some() {
            return Err(self.invalid());
        }
        Ok(())
    }

    fn parse_type_parameters(&mut self) -> Result<()> {
        self.expect(b'<')?;
        loop {
            match self.peek() {
                Some(b'>') => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(_) => self.parse_type_parameter()?,
                None => return Err(self.invalid()),
            }
        }
    }

    fn parse_type_parameter(&mut self) -> Result<()> {
        self.identifier(b":")?;
        self.expect(b':')?;
        // class bound may be empty when only interface bounds follow
        if !matches!(self.peek(), Some(b':') | Some(b'>')) {
            self.parse_reference_type()?;
        }
        while self.peek() == Some(b':') {
            self.pos += 1;
            self.parse_reference_type()?;
        }
        Ok(())
    }

    fn parse_java_type(&mut self) -> Result<()> {
        match self.peek() {
            Some(b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z') => {
                self.pos += 1;
                Ok(())
            }
            _ => self.parse_reference_type(),
        }
    }

    fn parse_reference_type(&mut self) -> Result<()> {
        let mut dimensions = 0;
        while self.peek() == Some(b'[') {
            self.pos += 1;
            dimensions += 1;
            if dimensions > MAX_ARRAY_DIMENSIONS {
                return Err(self.invalid());
            }
        }
        match self.peek() {
            Some(b'L') => self.parse_class_type(),
            Some(b'T') => {
                self.pos += 1;
                self.identifier(b";")?;
                self.expect(b';')
            }
            Some(b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z') if dimensions > 0 => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(self.invalid()),
        }
    }

    fn parse_class_type(&mut self) -> Result<()> {
        self.expect(b'L')?;
        let mut name = self.identifier(b"<.;")?.to_string();
        loop {
            if self.peek() == Some(b'<') {
                self.parse_type_arguments()?;
            }
            match self.peek() {
                Some(b';') => {
                    self.pos += 1;
                    self.out.insert(name);
                    return Ok(());
                }
                Some(b'.') => {
                    self.pos += 1;
                    self.out.insert(name.clone());
                    let inner = self.identifier(b"<.;")?;
                    name.push('$');
                    name.push_str(inner);
                }
                _ => return Err(self.invalid()),
            }
        }
    }

    fn parse_type_arguments(&mut self) -> Result<()> {
        if self.depth == MAX_TYPE_ARGUMENT_DEPTH {
            return Err(self.invalid());
        }
        self.depth += 1;
        let parsed = self.parse_type_argument_list();
        self.depth -= 1;
        parsed
    }

    fn parse_type_argument_list(&mut self) -> Result<()> {
        self.expect(b'<')?;
        loop {
            match self.peek() {
                Some(b'>') => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(b'*') => self.pos += 1,
                Some(b'+' | b'-') => {
                    self.pos += 1;
                    self.parse_reference_type()?;
                }
                Some(_) => self.parse_reference_type()?,
                None => return Err(self.invalid()),
            }
        }
    }

    fn identifier(&mut self, terminators: &[u8]) -> Result<&'a str> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if terminators.contains(&b) {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.invalid());
        }
        Ok(&self.input[start..self.pos])
    }

    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn expect(&mut self, b: u8) -> Result<()> {
        if self.peek() == Some(b) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.invalid())
        }
    }

    fn invalid(&self) -> ClassFileError {
        ClassFileError::InvalidDescriptor(self.input.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types(input: &str) -> Vec<String> {
        let mut out = BTreeSet::new();
        collect_referenced_types(input, &mut out).unwrap();
        out.into_iter().collect()
    }

    #[test]
    fn field_descriptors_drop_primitives_and_unwrap_arrays() {
        assert!(types("I").is_empty());
        assert!(types("[[J").is_empty());
        assert_eq!(types("[[Ljava/lang/String;"), vec!["java/lang/String"]);
    }

    #[test]
    fn method_descriptor_collects_parameters_and_return() {
        assert_eq!(
            types("(ILcom/a/Foo;[Lcom/b/Bar;)Lcom/c/Baz;"),
            vec!["com/a/Foo", "com/b/Bar", "com/c/Baz"]
        );
        assert!(types("()V").is_empty());
    }

    #[test]
    fn class_signature_with_bounds_and_wildcards() {
        let sig = "<T:Ljava/lang/Object;:Ljava/lang/Comparable<-TT;>;>Lcom/a/Base<TT;>;Ljava/util/List<+Lcom/b/Item;>;";
        assert_eq!(
            types(sig),
            vec![
                "com/a/Base",
                "com/b/Item",
                "java/lang/Comparable",
                "java/lang/Object",
                "java/util/List"
            ]
        );
    }

    #[test]
    fn interface_only_bound_and_throws_clause() {
        let sig = "<E::Lcom/a/Marker;>(TE;)Ljava/util/Map<*Ljava/lang/String;>;^Lcom/a/Failure;^TX;";
        assert_eq!(
            types(sig),
            vec!["com/a/Failure", "com/a/Marker", "java/lang/String", "java/util/Map"]
        );
    }

    #[test]
    fn inner_class_signature_yields_outer_and_nested() {
        assert_eq!(
            types("Lcom/a/Outer<Ljava/lang/String;>.Inner<TT;>;"),
            vec!["com/a/Outer", "com/a/Outer$Inner", "java/lang/String"]
        );
    }

    #[test]
    fn malformed_input_is_an_error() {
        let mut out = BTreeSet::new();
        for bad in ["", "Lcom/a/Foo", "(I", "(I)", "Q", "()VX", "<T>V"] {
            assert!(
                collect_referenced_types(bad, &mut out).is_err(),
                "expected error for {bad:?}"
            );
        }
    }

    #[test]
    fn array_dimensions_are_bounded() {
        let mut out = BTreeSet::new();
        let widest = format!("{}Lcom/a/Foo;", "[".repeat(MAX_ARRAY_DIMENSIONS));
        collect_referenced_types(&widest, &mut out).unwrap();
        assert!(out.contains("com/a/Foo"));

        let deep = format!("{}I", "[".repeat(60_000));
        assert!(matches!(
            collect_referenced_types(&deep, &mut out),
            Err(ClassFileError::InvalidDescriptor(_))
        ));
        assert!(class_constant_element(&format!("[{deep}")).is_err());
    }

    #[test]
    fn type_argument_nesting_is_bounded() {
        let nested = |depth: usize| {
            format!(
                "{}Ljava/lang/Object;{};",
                "Ljava/util/List<".repeat(depth),
                ">;".repeat(depth).trim_end_matches(';')
            )
        };
        assert_eq!(
            types(&nested(MAX_TYPE_ARGUMENT_DEPTH)),
            vec!["java/lang/Object", "java/util/List"]
        );

        let mut out = BTreeSet::new();
        assert!(matches!(
            collect_referenced_types(&nested(50_000), &mut out),
            Err(ClassFileError::InvalidDescriptor(_))
        ));
    }

    #[test]
    fn class_constants_unwrap_arrays() {
        assert_eq!(
            class_constant_element("com/a/Foo").unwrap().as_deref(),
            Some("com/a/Foo")
        );
        assert_eq!(
            class_constant_element("[[Lcom/a/Foo;").unwrap().as_deref(),
            Some("com/a/Foo")
        );
        assert_eq!(class_constant_element("[I").unwrap(), None);
    }
}
