//! Descriptor model: the in-memory representation of a parsed Appfile.
//!
//! A [`File`] is constructed by [`parse_descriptor_file`] or
//! [`default_file`], mutated only during merge and compilation (identity
//! assignment), and becomes immutable once wrapped in a
//! [`Compiled`](crate::compiler::Compiled).

pub mod default;
pub mod file;
pub mod identity;
pub mod parser;

pub use default::{default_file, DetectConfig, Detector};
pub use file::{
    Application, Customization, Dependency, File, Foundation, Import, Infrastructure, Project,
};
pub use parser::{parse_descriptor, parse_descriptor_file, DescriptorFormat};
