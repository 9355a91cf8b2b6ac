//! Filter predicates and their compilation to parameterised SQL.
//!
//! User text never reaches the SQL string: every value is bound through a
//! `?` placeholder and every column comes from the closed [`Column`] set.

use rusqlite::types::Value;
use std::path::{Path, PathBuf};

/// Filterable fields of an image record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Path,
    LastModified,
    ExifDatetime,
    Make,
    Model,
    Lens,
    Rating,
    Location,
    Title,
    Caption,
    Tags,
}

impl Column {
    pub fn as_str(&self) -> &'static str {
        match self {
            Column::Path => "path",
            Column::LastModified => "last_modified",
            Column::ExifDatetime => "exif_datetime",
            Column::Make => "make",
            Column::Model => "model",
            Column::Lens => "lens",
            Column::Rating => "rating",
            Column::Location => "location",
            Column::Title => "title",
            Column::Caption => "caption",
            Column::Tags => "tags",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Less,
    Greater,
}

impl CompareOp {
    fn as_sql(&self) -> &'static str {
        match self {
            CompareOp::Less => "<",
            CompareOp::Greater => ">",
        }
    }
}

/// A tagged expression tree evaluated against image records.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    /// Case-insensitive substring match.
    Like { column: Column, needle: String },
    Compare { column: Column, op: CompareOp, value: f64 },
    /// Path lies inside the directory (recursively).
    PathUnder(PathBuf),
    /// Month (1-12) of `exif_datetime`, local calendar.
    Month(u32),
    /// Month and day of `exif_datetime`, local calendar.
    MonthDay { month: u32, day: u32 },
}

impl Predicate {
    pub fn like(column: Column, needle: impl Into<String>) -> Self {
        Predicate::Like {
            column,
            needle: needle.into(),
        }
    }

    /// Images taken strictly after `timestamp` (unix seconds).
    pub fn taken_after(timestamp: f64) -> Self {
        Predicate::Compare {
            column: Column::ExifDatetime,
            op: CompareOp::Greater,
            value: timestamp,
        }
    }

    /// Images taken strictly before `timestamp` (unix seconds).
    pub fn taken_before(timestamp: f64) -> Self {
        Predicate::Compare {
            column: Column::ExifDatetime,
            op: CompareOp::Less,
            value: timestamp,
        }
    }

    pub fn path_under(dir: &Path) -> Self {
        Predicate::PathUnder(dir.to_path_buf())
    }

    /// Append this predicate as SQL to `sql`, pushing bound values onto `params`.
    pub fn compile(&self, sql: &mut String, params: &mut Vec<Value>) {
        match self {
            Predicate::And(parts) => compile_joined(parts, " AND ", "1", sql, params),
            Predicate::Or(parts) => compile_joined(parts, " OR ", "0", sql, params),
            Predicate::Not(inner) => {
                sql.push_str("NOT (");
                inner.compile(sql, params);
                sql.push(')');
            }
            Predicate::Like { column, needle } => {
                sql.push_str(&format!(
                    "IFNULL({}, '') LIKE ? ESCAPE '\\'",
                    column.as_str()
                ));
                params.push(Value::Text(format!("%{}%", escape_like(needle))));
            }
            Predicate::Compare { column, op, value } => {
                sql.push_str(&format!("{} {} ?", column.as_str(), op.as_sql()));
                params.push(Value::Real(*value));
            }
            Predicate::PathUnder(dir) => {
                let mut prefix = dir.to_string_lossy().to_string();
                if !prefix.ends_with('/') {
                    prefix.push('/');
                }
                sql.push_str("path LIKE ? ESCAPE '\\'");
                params.push(Value::Text(format!("{}%", escape_like(&prefix))));
            }
            Predicate::Month(month) => {
                sql.push_str(
                    "CAST(STRFTIME('%m', DATETIME(exif_datetime, 'unixepoch', 'localtime')) AS INTEGER) = ?",
                );
                params.push(Value::Integer(i64::from(*month)));
            }
            Predicate::MonthDay { month, day } => {
                sql.push_str(
                    "STRFTIME('%m%d', DATETIME(exif_datetime, 'unixepoch', 'localtime')) = ?",
                );
                params.push(Value::Text(format!("{:02}{:02}", month, day)));
            }
        }
    }
}

fn compile_joined(
    parts: &[Predicate],
    separator: &str,
    empty: &str,
    sql: &mut String,
    params: &mut Vec<Value>,
) {
    if parts.is_empty() {
        sql.push_str(empty);
        return;
    }
    sql.push('(');
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            sql.push_str(separator);
        }
        part.compile(sql, params);
    }
    sql.push(')');
}

/// Escape LIKE wildcards so the needle matches literally.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_nested() {
        let predicate = Predicate::And(vec![
            Predicate::path_under(Path::new("/pics/2020")),
            Predicate::Or(vec![
                Predicate::like(Column::Location, "paris"),
                Predicate::Not(Box::new(Predicate::like(Column::Tags, "beach"))),
            ]),
        ]);

        let mut sql = String::new();
        let mut params = Vec::new();
        predicate.compile(&mut sql, &mut params);

        assert_eq!(
            sql,
            "(path LIKE ? ESCAPE '\\' AND (IFNULL(location, '') LIKE ? ESCAPE '\\' OR NOT (IFNULL(tags, '') LIKE ? ESCAPE '\\')))"
        );
        assert_eq!(params.len(), 3);
        assert_eq!(params[0], Value::Text("/pics/2020/%".to_string()));
    }

    #[test]
    fn test_like_escapes_wildcards() {
        let mut sql = String::new();
        let mut params = Vec::new();
        Predicate::like(Column::Title, "100%_done").compile(&mut sql, &mut params);
        assert_eq!(params[0], Value::Text("%100\\%\\_done%".to_string()));
    }

    #[test]
    fn test_empty_conjunction_is_true() {
        let mut sql = String::new();
        let mut params = Vec::new();
        Predicate::And(vec![]).compile(&mut sql, &mut params);
        assert_eq!(sql, "1");
        assert!(params.is_empty());
    }
}
