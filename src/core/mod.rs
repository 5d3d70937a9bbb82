// Module declarations
pub mod error;
pub mod value;
pub mod column;
pub mod table_metadata;

// Re-exports for convenience
pub use error::{DbError, DbResult, RegistryError, ShellError, ShellResult, StackTrace};
pub use value::Value;
pub use column::{ColumnDescription, TypeTag};
pub use table_metadata::{ColumnMetadata, IndexMetadata};

/// One result row, in column order.
pub type Row = Vec<Value>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_description_builders() {
        let col = ColumnDescription::new("name", "varchar", Some(TypeTag::String))
            .with_sizes(Some(10), Some(-1))
            .with_nullable(Some(true));
        assert!(col.is(TypeTag::String));
        assert!(!col.is(TypeTag::Number));
        assert_eq!(col.display_size, Some(10));
        assert_eq!(col.internal_size, Some(-1));
        assert_eq!(col.nullable, Some(true));
    }
}
