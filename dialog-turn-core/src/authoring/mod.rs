//! Authoring pipeline: YAML → DTO → validation → compiled [`crate::tree::DialogTree`].

pub mod compile;
pub mod dto;
pub mod inline;
pub mod validate;
pub mod yaml;

pub use compile::{compile_tree, compile_tree_yaml};
pub use dto::DialogTreeDto;
pub use validate::{validate_dto, ValidationError};
pub use yaml::parse_tree_yaml;
