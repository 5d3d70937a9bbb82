//! Default table metadata, built from the column description of a zero-row
//! probe query. Drivers with richer catalogs override
//! [`NativeCursor::table_metadata`](super::NativeCursor::table_metadata).

use crate::core::{ColumnDescription, ColumnMetadata, DbResult, TypeTag};
use super::NativeCursor;

/// Runs `SELECT * FROM <table> WHERE 1=0` and classifies each column.
pub fn probe_table_metadata<C: NativeCursor + ?Sized>(
    cursor: &mut C,
    table: &str,
) -> DbResult<Vec<ColumnMetadata>> {
    cursor.execute(&format!("SELECT * FROM {table} WHERE 1=0"), &[])?;
    let description = cursor.description().unwrap_or_default();
    Ok(description.iter().map(classify_column).collect())
}

/// Maps one column description onto the uniform metadata shape.
///
/// STRING columns take their size from the internal size when it is a
/// positive number, otherwise from the display size; a size of 1 is a
/// `char`, anything else a `varchar`.
#[must_use]
pub fn classify_column(col: &ColumnDescription) -> ColumnMetadata {
    let mut size = col.display_size;
    let type_name = match col.tag {
        Some(TypeTag::Binary) => "blob".to_string(),
        Some(TypeTag::DateTime) => "datetime".to_string(),
        Some(TypeTag::Number) => "numeric".to_string(),
        Some(TypeTag::String) => {
            size = match col.internal_size {
                Some(n) if n > 0 => Some(n),
                _ => col.display_size,
            };
            if size == Some(1) { "char" } else { "varchar" }.to_string()
        }
        Some(TypeTag::RowId) => "id".to_string(),
        None => format!("unknown (type code={})", col.type_code),
    };

    ColumnMetadata {
        name: col.name.clone(),
        type_name,
        max_char_size: size,
        precision: col.precision,
        scale: col.scale,
        nullable: col.nullable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string_col(display: Option<i64>, internal: Option<i64>) -> ColumnDescription {
        ColumnDescription::new("name", "VARCHAR", Some(TypeTag::String)).with_sizes(display, internal)
    }

    #[test]
    fn test_string_prefers_valid_internal_size() {
        let meta = classify_column(&string_col(Some(10), Some(40)));
        assert_eq!(meta.type_name, "varchar");
        assert_eq!(meta.max_char_size, Some(40));
    }

    #[test]
    fn test_string_falls_back_to_display_size() {
        let meta = classify_column(&string_col(Some(10), Some(0)));
        assert_eq!(meta.type_name, "varchar");
        assert_eq!(meta.max_char_size, Some(10));

        let meta = classify_column(&string_col(Some(10), Some(-1)));
        assert_eq!(meta.max_char_size, Some(10));

        let meta = classify_column(&string_col(Some(10), None));
        assert_eq!(meta.max_char_size, Some(10));
    }

    #[test]
    fn test_single_character_is_char() {
        let meta = classify_column(&string_col(Some(1), None));
        assert_eq!(meta.type_name, "char");
        assert_eq!(meta.max_char_size, Some(1));
    }

    #[test]
    fn test_other_tags() {
        let cases = [
            (Some(TypeTag::Binary), "blob"),
            (Some(TypeTag::DateTime), "datetime"),
            (Some(TypeTag::Number), "numeric"),
            (Some(TypeTag::RowId), "id"),
        ];
        for (tag, expected) in cases {
            let col = ColumnDescription::new("c", "x", tag);
            assert_eq!(classify_column(&col).type_name, expected);
        }
    }

    #[test]
    fn test_unknown_type_code() {
        let col = ColumnDescription::new("flag", "bool", None).with_nullable(Some(false));
        let meta = classify_column(&col);
        assert_eq!(meta.type_name, "unknown (type code=bool)");
        assert_eq!(meta.nullable, Some(false));
    }
}
