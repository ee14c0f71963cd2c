use std::fmt;

use anyhow::Result;
use rusqlite::types::Value;

use crate::db::Row;

const FIELD_DELIMITER: char = '|';
const KEY_VALUE_SEPARATOR: char = ':';
const ESCAPE: char = '\\';

/// The audited subset of a row at the moment of change, in audited-field
/// order. Renders as `field:value|field:value`, with NULL as an empty value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldSnapshot {
    fields: Vec<(String, Option<String>)>,
}

impl FieldSnapshot {
    /// Captures `fields` from `row`. Columns absent from the row are treated
    /// as NULL.
    pub fn capture(fields: &[&str], row: &Row) -> Self {
        let fields = fields
            .iter()
            .map(|field| (field.to_string(), row.get(*field).and_then(render_value)))
            .collect();
        Self { fields }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .and_then(|(_, value)| value.as_deref())
    }

    pub fn fields(&self) -> &[(String, Option<String>)] {
        &self.fields
    }

    /// Reads back a rendered snapshot. An empty value parses as NULL, so an
    /// empty string and NULL are indistinguishable once stored.
    pub fn parse(s: &str) -> Result<Self> {
        let mut fields = Vec::new();
        if s.is_empty() {
            return Ok(Self { fields });
        }

        for part in split_unescaped(s, FIELD_DELIMITER) {
            let mut pair = split_unescaped(&part, KEY_VALUE_SEPARATOR).into_iter();
            let (name, value) = match (pair.next(), pair.next(), pair.next()) {
                (Some(name), Some(value), None) => (name, value),
                _ => return Err(anyhow::anyhow!("Malformed snapshot field: {}", part)),
            };
            let value = unescape(&value);
            fields.push((unescape(&name), if value.is_empty() { None } else { Some(value) }));
        }
        Ok(Self { fields })
    }
}

impl fmt::Display for FieldSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", FIELD_DELIMITER)?;
            }
            write!(
                f,
                "{}{}{}",
                escape(name),
                KEY_VALUE_SEPARATOR,
                value.as_deref().map(escape).unwrap_or_default()
            )?;
        }
        Ok(())
    }
}

fn render_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(f) => Some(f.to_string()),
        Value::Text(s) => Some(s.clone()),
        Value::Blob(b) => Some(format!("<{} bytes>", b.len())),
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == ESCAPE || c == FIELD_DELIMITER || c == KEY_VALUE_SEPARATOR {
            out.push(ESCAPE);
        }
        out.push(c);
    }
    out
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == ESCAPE {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Splits on `delimiter` where it is not escaped. Escapes are kept in the
/// pieces so they can be split again or unescaped.
fn split_unescaped(s: &str, delimiter: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == ESCAPE {
            current.push(c);
            if let Some(next) = chars.next() {
                current.push(next);
            }
        } else if c == delimiter {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    parts.push(current);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row;

    #[test]
    fn renders_in_field_order_with_nulls_empty() {
        let r = row! {
            "full_name" => "Ama Mensah",
            "age" => 31_i64,
            "sex" => "F",
            "relationship_to_head" => Option::<&str>::None,
        };
        let snapshot = FieldSnapshot::capture(&["full_name", "sex", "age", "relationship_to_head"], &r);
        assert_eq!(
            snapshot.to_string(),
            "full_name:Ama Mensah|sex:F|age:31|relationship_to_head:"
        );
    }

    #[test]
    fn delimiters_in_values_survive_parse() -> Result<()> {
        let r = row! { "detailed_address" => "Plot 4|Block C: near C:\\market", "region_name" => "Ashanti" };
        let snapshot = FieldSnapshot::capture(&["region_name", "detailed_address"], &r);
        let rendered = snapshot.to_string();
        assert_eq!(rendered, "region_name:Ashanti|detailed_address:Plot 4\\|Block C\\: near C\\:\\\\market");

        let parsed = FieldSnapshot::parse(&rendered)?;
        assert_eq!(parsed, snapshot);
        assert_eq!(parsed.get("detailed_address"), Some("Plot 4|Block C: near C:\\market"));
        Ok(())
    }

    #[test]
    fn malformed_snapshot_is_an_error() {
        assert!(FieldSnapshot::parse("full_name").is_err());
        assert!(FieldSnapshot::parse("a:b:c").is_err());
    }
}
