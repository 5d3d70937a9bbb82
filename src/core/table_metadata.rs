use serde::{Deserialize, Serialize};

/// Column description returned by a table-metadata probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    /// e.g. "varchar", "numeric", "blob", or a native type name
    pub type_name: String,
    /// Maximum size of a character column
    pub max_char_size: Option<i64>,
    pub precision: Option<i64>,
    pub scale: Option<i64>,
    /// `None` when the backend cannot tell
    pub nullable: Option<bool>,
}

impl ColumnMetadata {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            max_char_size: None,
            precision: None,
            scale: None,
            nullable: None,
        }
    }

    /// Type rendered the way `describe` prints it: `varchar(20)`,
    /// `numeric(10, 2)`, or the bare type name.
    #[must_use]
    pub fn display_type(&self) -> String {
        if let Some(size) = self.max_char_size.filter(|s| *s > 0) {
            return format!("{}({size})", self.type_name);
        }

        let mut parts = Vec::new();
        if let Some(p) = self.precision.filter(|p| *p > 0) {
            parts.push(p.to_string());
        }
        if let Some(s) = self.scale.filter(|s| *s > 0) {
            parts.push(s.to_string());
        }

        if parts.is_empty() {
            self.type_name.clone()
        } else {
            format!("{}({})", self.type_name, parts.join(", "))
        }
    }

    #[must_use]
    pub const fn nullability(&self) -> &'static str {
        match self.nullable {
            None => "",
            Some(true) => "NULL",
            Some(false) => "NOT NULL",
        }
    }
}

/// One index on a table: name, ordered key columns, free-form description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub name: String,
    pub columns: Vec<String>,
    pub description: Option<String>,
}

impl IndexMetadata {
    pub fn new(name: impl Into<String>, columns: Vec<String>, description: Option<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            description,
        }
    }
}
