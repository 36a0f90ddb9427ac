use std::collections::BTreeSet;

use crate::classfile::ClassRecord;
use crate::constant_pool::ConstantPoolEntry;
use crate::descriptor::{class_constant_element, collect_referenced_types, internal_to_binary};
use crate::error::ClassFileError;

/// Binary names of every class `record` refers to.
///
/// Covers the super class, interfaces, member descriptors and signatures, the
/// class signature, annotation types, and all `Class`, `NameAndType` and
/// `MethodType` constants (types visible only through instructions, catch
/// clauses or casts). Primitives and the class itself are never included.
pub fn dependent_classes(record: &ClassRecord) -> Result<BTreeSet<String>, ClassFileError> {
    let mut internal = BTreeSet::new();

    for field in &record.fields {
        collect_referenced_types(&field.descriptor, &mut internal)?;
        if let Some(sig) = &field.signature {
            collect_referenced_types(sig, &mut internal)?;
        }
        for ann in &field.annotation_types {
            collect_referenced_types(ann, &mut internal)?;
        }
    }
    for method in &record.methods {
        collect_referenced_types(&method.descriptor, &mut internal)?;
        if let Some(sig) = &method.signature {
            collect_referenced_types(sig, &mut internal)?;
        }
        for ann in &method.annotation_types {
            collect_referenced_types(ann, &mut internal)?;
        }
    }
    if let Some(sig) = &record.signature {
        collect_referenced_types(sig, &mut internal)?;
    }
    for ann in &record.annotation_types {
        collect_referenced_types(ann, &mut internal)?;
    }

    for name in record.class_constants() {
        if let Some(element) = class_constant_element(name)? {
            internal.insert(element);
        }
    }

    let pool = &record.constant_pool;
    for (_, entry) in pool.iter() {
        match entry {
            ConstantPoolEntry::NameAndType {
                descriptor_index, ..
            }
            | ConstantPoolEntry::MethodType { descriptor_index } => {
                collect_referenced_types(pool.utf8(*descriptor_index)?, &mut internal)?;
            }
            _ => {}
        }
    }

    let mut names: BTreeSet<String> = internal.iter().map(|n| internal_to_binary(n)).collect();
    if let Some(sup) = &record.super_class {
        names.insert(sup.clone());
    }
    names.extend(record.interfaces.iter().cloned());
    names.remove(&record.this_class);
    Ok(names)
}

impl ClassRecord {
    pub fn dependent_classes(&self) -> Result<BTreeSet<String>, ClassFileError> {
        dependent_classes(self)
    }
}
