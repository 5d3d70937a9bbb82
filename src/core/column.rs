use serde::{Deserialize, Serialize};

/// Uniform column classification every driver maps its native types onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeTag {
    Binary,
    Number,
    String,
    DateTime,
    /// Backends without a distinct row identifier type report `Number` instead.
    RowId,
}

/// Per-column result metadata, valid only after a successful execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescription {
    pub name: String,
    /// Native type name or code as reported by the backend.
    pub type_code: String,
    /// `None` when the native type maps to none of the uniform tags.
    pub tag: Option<TypeTag>,
    pub display_size: Option<i64>,
    pub internal_size: Option<i64>,
    pub precision: Option<i64>,
    pub scale: Option<i64>,
    pub nullable: Option<bool>,
}

impl ColumnDescription {
    pub fn new(name: impl Into<String>, type_code: impl Into<String>, tag: Option<TypeTag>) -> Self {
        Self {
            name: name.into(),
            type_code: type_code.into(),
            tag,
            display_size: None,
            internal_size: None,
            precision: None,
            scale: None,
            nullable: None,
        }
    }

    #[must_use]
    pub const fn with_sizes(mut self, display_size: Option<i64>, internal_size: Option<i64>) -> Self {
        self.display_size = display_size;
        self.internal_size = internal_size;
        self
    }

    #[must_use]
    pub const fn with_precision(mut self, precision: Option<i64>, scale: Option<i64>) -> Self {
        self.precision = precision;
        self.scale = scale;
        self
    }

    #[must_use]
    pub const fn with_nullable(mut self, nullable: Option<bool>) -> Self {
        self.nullable = nullable;
        self
    }

    #[must_use]
    pub fn is(&self, tag: TypeTag) -> bool {
        self.tag == Some(tag)
    }
}
