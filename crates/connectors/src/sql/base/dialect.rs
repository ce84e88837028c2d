//! Database-specific SQL syntax needed to compile insert statements.

pub trait Dialect: Send + Sync {
    /// Returns the placeholder for the parameter at `index` (zero-based).
    fn get_placeholder(&self, index: usize) -> String;
}

/// PostgreSQL numbers its placeholders: `$1`, `$2`, ...
#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl Dialect for Postgres {
    fn get_placeholder(&self, index: usize) -> String {
        format!("${}", index + 1)
    }
}
