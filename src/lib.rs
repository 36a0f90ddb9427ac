//! # class-slice
//!
//! Decodes Java class files, indexes class roots (directories and jars), and
//! checks dependency rules between slices of classes.
//!
//! ## Architecture
//!
//! - **reader / constant_pool / classfile**: class file decoder
//! - **descriptor / deps**: dependency extraction from descriptors, signatures and constants
//! - **scan**: directory and archive traversal, jar discovery
//! - **root**: class locations, packages and roots
//! - **resolver**: frozen name index over an ordered list of roots
//! - **clazz**: flyweight class handles with decode-once records
//! - **classpath**: the resolution context owning all handles
//! - **pattern / slice / report**: slices, dependency rules and violation reports
//! - **duplicates**: content-hashing duplicate class detection
//! - **config / cli**: command line and environment configuration

pub mod classfile;
pub mod classpath;
pub mod clazz;
pub mod cli;
pub mod config;
pub mod constant_pool;
pub mod deps;
pub mod descriptor;
pub mod duplicates;
pub mod error;
pub mod pattern;
mod reader;
pub mod report;
pub mod resolver;
pub mod root;
pub mod scan;
pub mod slice;

#[cfg(test)]
#[path = "../tests/common/classgen.rs"]
mod classgen;

pub use classpath::{Classpath, Root};
pub use clazz::Clazz;
pub use error::{Error, Result};
pub use slice::Slice;
