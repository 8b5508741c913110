//! Built-in schema types: the root `any` type and the `binary` type.
//!
//! # Example
//!
//! ```
//! use typeshape_types::*;
//!
//! let schema = binary().length(3).unwrap();
//! let report = schema.validate("5");
//!
//! assert_eq!(report.errors.len(), 1);
//! assert_eq!(report.errors[0].code, "binary.length");
//! assert_eq!(report.errors[0].message, "\"value\" must be 3 bytes");
//! ```

pub mod any;
pub mod binary;

pub use any::{AnySchema, any, any_type};
pub use binary::{BinarySchema, ENCODINGS, binary, binary_type, is_encoding};
pub use typeshape_core::*;

/// A registry holding every built-in type, for rebuilding described schemas.
pub fn registry() -> TypeRegistry {
    TypeRegistry::new().with(any_type()).with(binary_type())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_contains_builtins() {
        let names: Vec<_> = registry().type_names().map(String::from).collect();
        assert_eq!(names, vec!["any", "binary"]);
        assert!(binary_type().is_a("any"));
    }
}
