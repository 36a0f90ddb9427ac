//! Class file decoder.
//!
//! Decoding is strictly positional: header, constant pool, access flags,
//! this/super class, interfaces, fields, methods, class attributes. Only the
//! `Signature`, annotation, type annotation and `AnnotationDefault`
//! attributes are interpreted; every other attribute body is skipped by its
//! declared length.

use crate::constant_pool::{ConstantPool, ConstantPoolEntry};
use crate::descriptor::internal_to_binary;
use crate::error::ClassFileError;
use crate::reader::Reader;

type Result<T> = std::result::Result<T, ClassFileError>;

pub const MAGIC: u32 = 0xCAFEBABE;

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_FINAL: u16 = 0x0010;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ABSTRACT: u16 = 0x0400;
pub const ACC_SYNTHETIC: u16 = 0x1000;
pub const ACC_ANNOTATION: u16 = 0x2000;
pub const ACC_ENUM: u16 = 0x4000;
pub const ACC_MODULE: u16 = 0x8000;

const OBJECT: &str = "java/lang/Object";

/// Bound on nested annotation and array element values.
const MAX_ELEMENT_VALUE_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct FieldRecord {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,
    /// Field descriptors of every type mentioned by the field's annotations.
    pub annotation_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodRecord {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,
    pub annotation_types: Vec<String>,
}

impl MethodRecord {
    /// The generic signature when the method has one, otherwise the raw
    /// descriptor.
    pub fn generic_descriptor(&self) -> &str {
        self.signature.as_deref().unwrap_or(&self.descriptor)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassRecord {
    pub minor_version: u16,
    pub major_version: u16,
    pub access_flags: u16,
    /// Binary name, e.g. `com.a.Foo$Inner`.
    pub this_class: String,
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<FieldRecord>,
    pub methods: Vec<MethodRecord>,
    pub signature: Option<String>,
    pub annotation_types: Vec<String>,
    pub constant_pool: ConstantPool,
}

impl ClassRecord {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let magic = reader.read_u4()?;
        if magic != MAGIC {
            return Err(ClassFileError::InvalidMagic(magic));
        }

        let minor_version = reader.read_u2()?;
        let major_version = reader.read_u2()?;
        let cp = ConstantPool::parse(&mut reader)?;

        let access_flags = reader.read_u2()?;
        let this_internal = cp.class_name(reader.read_u2()?)?.to_string();
        let super_index = reader.read_u2()?;
        let super_class = if super_index == 0 {
            if this_internal != OBJECT && access_flags & ACC_MODULE == 0 {
                return Err(ClassFileError::MissingSuperClass(internal_to_binary(
                    &this_internal,
                )));
            }
            None
        } else {
            Some(internal_to_binary(cp.class_name(super_index)?))
        };

        let interfaces_count = reader.read_u2()? as usize;
        let mut interfaces = Vec::with_capacity(interfaces_count);
        for _ in 0..interfaces_count {
            interfaces.push(internal_to_binary(cp.class_name(reader.read_u2()?)?));
        }

        let fields_count = reader.read_u2()? as usize;
        let mut fields = Vec::with_capacity(fields_count);
        for _ in 0..fields_count {
            let member = parse_member(&mut reader, &cp)?;
            fields.push(FieldRecord {
                access_flags: member.access_flags,
                name: member.name,
                descriptor: member.descriptor,
                signature: member.attributes.signature,
                annotation_types: member.attributes.annotation_types,
            });
        }

        let methods_count = reader.read_u2()? as usize;
        let mut methods = Vec::with_capacity(methods_count);
        for _ in 0..methods_count {
            let member = parse_member(&mut reader, &cp)?;
            methods.push(MethodRecord {
                access_flags: member.access_flags,
                name: member.name,
                descriptor: member.descriptor,
                signature: member.attributes.signature,
                annotation_types: member.attributes.annotation_types,
            });
        }

        let class_attrs = parse_attributes(&mut reader, &cp)?;
        reader.ensure_empty()?;

        Ok(Self {
            minor_version,
            major_version,
            access_flags,
            this_class: internal_to_binary(&this_internal),
            super_class,
            interfaces,
            fields,
            methods,
            signature: class_attrs.signature,
            annotation_types: class_attrs.annotation_types,
            constant_pool: cp,
        })
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags & ACC_INTERFACE != 0
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags & ACC_ABSTRACT != 0
    }

    pub fn is_annotation(&self) -> bool {
        self.access_flags & ACC_ANNOTATION != 0
    }

    pub fn is_enum(&self) -> bool {
        self.access_flags & ACC_ENUM != 0
    }

    pub fn is_final(&self) -> bool {
        self.access_flags & ACC_FINAL != 0
    }

    pub fn is_public(&self) -> bool {
        self.access_flags & ACC_PUBLIC != 0
    }

    pub fn is_synthetic(&self) -> bool {
        self.access_flags & ACC_SYNTHETIC != 0
    }

    /// Names of the class access flags that are set, as `javap` prints them.
    pub fn flag_names(&self) -> Vec<&'static str> {
        [
            (self.is_public(), "public"),
            (self.is_final(), "final"),
            (self.is_interface(), "interface"),
            (self.is_abstract(), "abstract"),
            (self.is_synthetic(), "synthetic"),
            (self.is_annotation(), "annotation"),
            (self.is_enum(), "enum"),
        ]
        .into_iter()
        .filter_map(|(set, name)| set.then_some(name))
        .collect()
    }

    /// Internal names of every `Class` constant, in pool order.
    pub fn class_constants(&self) -> impl Iterator<Item = &str> {
        self.constant_pool.iter().filter_map(|(_, entry)| match entry {
            ConstantPoolEntry::Class { name_index } => self.constant_pool.utf8(*name_index).ok(),
            _ => None,
        })
    }

    pub fn dump_constant_pool(&self) -> String {
        self.constant_pool.dump()
    }
}

struct Member {
    access_flags: u16,
    name: String,
    descriptor: String,
    attributes: ParsedAttributes,
}

fn parse_member(reader: &mut Reader<'_>, cp: &ConstantPool) -> Result<Member> {
    let access_flags = reader.read_u2()?;
    let name = cp.utf8(reader.read_u2()?)?.to_string();
    let descriptor = cp.utf8(reader.read_u2()?)?.to_string();
    let attributes = parse_attributes(reader, cp)?;
    Ok(Member {
        access_flags,
        name,
        descriptor,
        attributes,
    })
}

#[derive(Default)]
struct ParsedAttributes {
    signature: Option<String>,
    annotation_types: Vec<String>,
}

fn parse_attributes(reader: &mut Reader<'_>, cp: &ConstantPool) -> Result<ParsedAttributes> {
    let attributes_count = reader.read_u2()? as usize;
    let mut parsed = ParsedAttributes::default();
    for _ in 0..attributes_count {
        let name_index = reader.read_u2()?;
        let length = reader.read_u4()? as usize;
        let info = reader.read_bytes(length)?;
        let name = cp.utf8(name_index)?;

        let mut sub = Reader::new(info);
        match name {
            "Signature" => {
                let sig_index = sub.read_u2().map_err(|_| malformed("Signature"))?;
                parsed.signature = Some(cp.utf8(sig_index)?.to_string());
                sub.ensure_empty().map_err(|_| malformed("Signature"))?;
            }
            "RuntimeVisibleAnnotations" | "RuntimeInvisibleAnnotations" => {
                let num = sub.read_u2()?;
                for _ in 0..num {
                    read_annotation(&mut sub, cp, &mut parsed.annotation_types, 0)?;
                }
                sub.ensure_empty().map_err(|_| malformed("annotations"))?;
            }
            "RuntimeVisibleTypeAnnotations" | "RuntimeInvisibleTypeAnnotations" => {
                let num = sub.read_u2()?;
                for _ in 0..num {
                    skip_type_annotation_target(&mut sub)?;
                    read_annotation(&mut sub, cp, &mut parsed.annotation_types, 0)?;
                }
                sub.ensure_empty()
                    .map_err(|_| malformed("type annotations"))?;
            }
            "AnnotationDefault" => {
                read_element_value(&mut sub, cp, &mut parsed.annotation_types, 0)?;
                sub.ensure_empty()
                    .map_err(|_| malformed("AnnotationDefault"))?;
            }
            "RuntimeVisibleParameterAnnotations" | "RuntimeInvisibleParameterAnnotations" => {
                let parameters = sub.read_u1()?;
                for _ in 0..parameters {
                    let num = sub.read_u2()?;
                    for _ in 0..num {
                        read_annotation(&mut sub, cp, &mut parsed.annotation_types, 0)?;
                    }
                }
                sub.ensure_empty()
                    .map_err(|_| malformed("parameter annotations"))?;
            }
            _ => {}
        }
    }
    Ok(parsed)
}

/// Skips `target_info` and `type_path` of a type annotation (JVMS 4.7.20),
/// leaving the reader at the annotation body.
fn skip_type_annotation_target(reader: &mut Reader<'_>) -> Result<()> {
    match reader.read_u1()? {
        0x00 | 0x01 | 0x16 => {
            reader.read_u1()?;
        }
        0x10..=0x12 | 0x17 | 0x42..=0x46 => {
            reader.read_u2()?;
        }
        0x13..=0x15 => {}
        0x40 | 0x41 => {
            let table_length = reader.read_u2()? as usize;
            reader.read_bytes(table_length * 6)?;
        }
        0x47..=0x4B => {
            reader.read_u2()?;
            reader.read_u1()?;
        }
        _ => return Err(malformed("type annotation target")),
    }
    let path_length = reader.read_u1()? as usize;
    reader.read_bytes(path_length * 2)?;
    Ok(())
}

fn read_annotation(
    reader: &mut Reader<'_>,
    cp: &ConstantPool,
    out: &mut Vec<String>,
    depth: usize,
) -> Result<()> {
    let type_index = reader.read_u2()?;
    out.push(cp.utf8(type_index)?.to_string());
    let pairs = reader.read_u2()?;
    for _ in 0..pairs {
        let _element_name = reader.read_u2()?;
        read_element_value(reader, cp, out, depth)?;
    }
    Ok(())
}

fn read_element_value(
    reader: &mut Reader<'_>,
    cp: &ConstantPool,
    out: &mut Vec<String>,
    depth: usize,
) -> Result<()> {
    if depth == MAX_ELEMENT_VALUE_DEPTH {
        return Err(malformed("annotation element value nesting"));
    }
    match reader.read_u1()? {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' => {
            reader.read_u2()?;
        }
        b'e' => {
            let type_index = reader.read_u2()?;
            out.push(cp.utf8(type_index)?.to_string());
            reader.read_u2()?;
        }
        b'c' => {
            let class_index = reader.read_u2()?;
            let descriptor = cp.utf8(class_index)?;
            if descriptor != "V" {
                out.push(descriptor.to_string());
            }
        }
        b'@' => read_annotation(reader, cp, out, depth + 1)?,
        b'[' => {
            let values = reader.read_u2()?;
            for _ in 0..values {
                read_element_value(reader, cp, out, depth + 1)?;
            }
        }
        _ => return Err(malformed("annotation element value")),
    }
    Ok(())
}

fn malformed(what: &'static str) -> ClassFileError {
    ClassFileError::MalformedAttribute(what)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classgen::ClassGen;

    #[test]
    fn decodes_header_members_and_hierarchy() {
        let bytes = ClassGen::new("com/a/Foo")
            .extends("com/a/Base")
            .implements("java/io/Serializable")
            .implements("java/lang/Runnable")
            .field("bar", "Lcom/b/Bar;")
            .field("count", "I")
            .method("run", "()V")
            .method_with_signature(
                "items",
                "()Ljava/util/List;",
                "()Ljava/util/List<Lcom/c/Item;>;",
            )
            .long_constant(7)
            .build();

        let record = ClassRecord::parse(&bytes).unwrap();
        assert_eq!(record.major_version, 52);
        assert_eq!(record.this_class, "com.a.Foo");
        assert_eq!(record.super_class.as_deref(), Some("com.a.Base"));
        assert_eq!(
            record.interfaces,
            vec!["java.io.Serializable", "java.lang.Runnable"]
        );
        let fields: Vec<_> = record
            .fields
            .iter()
            .map(|f| (f.name.as_str(), f.descriptor.as_str()))
            .collect();
        assert_eq!(fields, vec![("bar", "Lcom/b/Bar;"), ("count", "I")]);
        assert_eq!(record.methods.len(), 2);
        assert_eq!(record.methods[0].generic_descriptor(), "()V");
        assert_eq!(
            record.methods[1].generic_descriptor(),
            "()Ljava/util/List<Lcom/c/Item;>;"
        );
        assert!(record.is_public());
        assert!(!record.is_interface());
    }

    #[test]
    fn reads_class_signature_and_annotations() {
        let bytes = ClassGen::new("com/a/Repo")
            .signature("<T:Ljava/lang/Object;>Ljava/lang/Object;Lcom/a/Store<TT;>;")
            .annotation("Lcom/x/Entity;")
            .opaque_attribute("SourceFile", &[0, 1])
            .build();

        let record = ClassRecord::parse(&bytes).unwrap();
        assert_eq!(
            record.signature.as_deref(),
            Some("<T:Ljava/lang/Object;>Ljava/lang/Object;Lcom/a/Store<TT;>;")
        );
        assert_eq!(record.annotation_types, vec!["Lcom/x/Entity;"]);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = ClassGen::new("com/a/Foo").build();
        bytes[0] = 0xCB;
        assert_eq!(
            ClassRecord::parse(&bytes).unwrap_err(),
            ClassFileError::InvalidMagic(0xCBFEBABE)
        );
    }

    #[test]
    fn rejects_truncated_file() {
        let bytes = ClassGen::new("com/a/Foo").field("x", "I").build();
        let err = ClassRecord::parse(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(matches!(err, ClassFileError::UnexpectedEof { .. }));
    }

    #[test]
    fn only_object_may_omit_super_class() {
        let object = ClassGen::new("java/lang/Object").no_super().build();
        assert_eq!(ClassRecord::parse(&object).unwrap().super_class, None);

        let orphan = ClassGen::new("com/a/Orphan").no_super().build();
        assert_eq!(
            ClassRecord::parse(&orphan).unwrap_err(),
            ClassFileError::MissingSuperClass("com.a.Orphan".to_string())
        );
    }

    #[test]
    fn deeply_nested_element_values_are_rejected() {
        // one annotation (type #1) with one pair whose value is `depth`
        // nested single-element arrays around a string constant
        let class = |depth: usize| {
            let mut body = vec![0, 1, 0, 1, 0, 1, 0, 1];
            for _ in 0..depth {
                body.extend([b'[', 0, 1]);
            }
            body.extend([b's', 0, 1]);
            ClassGen::new("com/a/Foo")
                .opaque_attribute("RuntimeVisibleAnnotations", &body)
                .build()
        };
        assert!(ClassRecord::parse(&class(8)).is_ok());
        assert_eq!(
            ClassRecord::parse(&class(100_000)).unwrap_err(),
            ClassFileError::MalformedAttribute("annotation element value nesting")
        );
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = ClassGen::new("com/a/Foo").build();
        bytes.push(0);
        assert_eq!(
            ClassRecord::parse(&bytes).unwrap_err(),
            ClassFileError::TrailingBytes(1)
        );
    }
}
