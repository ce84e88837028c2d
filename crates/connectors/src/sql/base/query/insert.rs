//! Compiles the fixed insert statement a database sink executes for every
//! record.

use crate::sql::base::{dialect::Dialect, error::DbError};

pub const DEFAULT_QUERY_TEMPLATE: &str = "INSERT INTO {table} ({fields}) VALUES ({types})";

/// Unresolved insert definition as it comes from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertTemplate {
    pub template: String,
    pub table: String,
    pub field_names: Vec<String>,
    /// Placeholder token per field. `None` means one dialect placeholder per
    /// field (`$1, $2, ...` for PostgreSQL).
    pub field_types: Option<Vec<String>>,
}

/// A compiled insert statement together with the shape it expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedInsert {
    sql: String,
    table: String,
    field_names: Vec<String>,
}

impl InsertTemplate {
    pub fn new<T, I, F>(table: T, field_names: I) -> Self
    where
        T: Into<String>,
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        Self {
            template: DEFAULT_QUERY_TEMPLATE.to_string(),
            table: table.into(),
            field_names: field_names.into_iter().map(Into::into).collect(),
            field_types: None,
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn with_field_types<I, F>(mut self, field_types: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        self.field_types = Some(field_types.into_iter().map(Into::into).collect());
        self
    }

    /// Resolves the template into SQL. Fails if the definition cannot yield
    /// a well-formed single-row insert.
    pub fn compile(&self, dialect: &dyn Dialect) -> Result<PreparedInsert, DbError> {
        if !is_identifier(&self.table) {
            return Err(DbError::QueryBuildError(format!(
                "invalid table name '{}'",
                self.table
            )));
        }

        if self.field_names.is_empty() {
            return Err(DbError::QueryBuildError(
                "at least one field name is required".into(),
            ));
        }

        if let Some(bad) = self.field_names.iter().find(|f| !is_identifier(f)) {
            return Err(DbError::QueryBuildError(format!(
                "invalid field name '{bad}'"
            )));
        }

        for slot in ["{table}", "{fields}", "{types}"] {
            if !self.template.contains(slot) {
                return Err(DbError::QueryBuildError(format!(
                    "query template is missing the {slot} slot"
                )));
            }
        }

        let types = match &self.field_types {
            Some(types) if types.len() != self.field_names.len() => {
                return Err(DbError::QueryBuildError(format!(
                    "{} field types given for {} fields",
                    types.len(),
                    self.field_names.len()
                )));
            }
            Some(types) => types.clone(),
            None => (0..self.field_names.len())
                .map(|i| dialect.get_placeholder(i))
                .collect(),
        };

        let sql = self
            .template
            .replace("{table}", &self.table)
            .replace("{fields}", &self.field_names.join(", "))
            .replace("{types}", &types.join(", "));

        Ok(PreparedInsert {
            sql,
            table: self.table.clone(),
            field_names: self.field_names.clone(),
        })
    }
}

impl PreparedInsert {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Number of parameters every execution binds.
    pub fn arity(&self) -> usize {
        self.field_names.len()
    }
}

/// Accepts plain and schema-qualified SQL identifiers, and double-quoted
/// identifiers that contain no quote characters themselves.
fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.split('.').all(is_identifier_part)
}

fn is_identifier_part(part: &str) -> bool {
    if let Some(inner) = part.strip_prefix('"').and_then(|p| p.strip_suffix('"')) {
        return !inner.is_empty() && !inner.contains('"');
    }

    let mut chars = part.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::base::dialect::Postgres;

    #[test]
    fn test_compile_default_placeholders_postgres() {
        let insert = InsertTemplate::new("creds", ["username", "password"])
            .compile(&Postgres)
            .unwrap();
        assert_eq!(
            insert.sql(),
            "INSERT INTO creds (username, password) VALUES ($1, $2)"
        );
        assert_eq!(insert.arity(), 2);
        assert_eq!(insert.table(), "creds");
    }

    #[test]
    fn test_compile_explicit_types_and_template() {
        let insert = InsertTemplate::new("public.logins", ["host", "username"])
            .with_field_types(["$1::inet", "$2"])
            .with_template("INSERT INTO {table} ({fields}) VALUES ({types}) ON CONFLICT DO NOTHING")
            .compile(&Postgres)
            .unwrap();
        assert_eq!(
            insert.sql(),
            "INSERT INTO public.logins (host, username) VALUES ($1::inet, $2) ON CONFLICT DO NOTHING"
        );
    }

    #[test]
    fn test_compile_rejects_type_count_mismatch() {
        let err = InsertTemplate::new("creds", ["username", "password"])
            .with_field_types(["$1"])
            .compile(&Postgres)
            .unwrap_err();
        assert!(err.to_string().contains("1 field types given for 2 fields"));
    }

    #[test]
    fn test_compile_rejects_bad_identifiers() {
        assert!(
            InsertTemplate::new("creds; DROP TABLE x", ["username"])
                .compile(&Postgres)
                .is_err()
        );
        assert!(
            InsertTemplate::new("creds", ["user name"])
                .compile(&Postgres)
                .is_err()
        );
        assert!(
            InsertTemplate::new("creds", Vec::<String>::new())
                .compile(&Postgres)
                .is_err()
        );
        assert!(
            InsertTemplate::new("\"Creds\"", ["\"User\""])
                .compile(&Postgres)
                .is_ok()
        );
    }

    #[test]
    fn test_compile_rejects_template_without_slots() {
        let err = InsertTemplate::new("creds", ["username"])
            .with_template("INSERT INTO creds VALUES ({types})")
            .compile(&Postgres)
            .unwrap_err();
        assert!(matches!(err, DbError::QueryBuildError(msg) if msg.contains("{table}")));
    }
}
