use std::fmt;

use floe_error::{DbError, Result};

use super::datatype::{DataType, Field};

/// Ordered list of fields describing a table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: impl IntoIterator<Item = Field>) -> Self {
        Schema {
            fields: fields.into_iter().collect(),
        }
    }

    pub fn empty() -> Self {
        Schema { fields: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn datatypes(&self) -> impl Iterator<Item = &DataType> {
        self.fields.iter().map(|f| &f.datatype)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Get a field by name, erroring with a suggestion if it doesn't exist.
    pub fn try_get(&self, name: &str) -> Result<&Field> {
        self.get(name)
            .ok_or_else(|| column_not_found(name, self.names()))
    }

    pub fn push(&mut self, field: Field) {
        self.fields.push(field);
    }

    /// Insert or replace a field by name.
    pub fn upsert(&mut self, field: Field) {
        match self.index_of(&field.name) {
            Some(idx) => self.fields[idx] = field,
            None => self.fields.push(field),
        }
    }

    /// Merge fields from another schema, appending those not already present.
    pub fn merge(&mut self, other: &Schema) {
        for field in &other.fields {
            if !self.contains(&field.name) {
                self.fields.push(field.clone());
            }
        }
    }
}

impl FromIterator<Field> for Schema {
    fn from_iter<T: IntoIterator<Item = Field>>(iter: T) -> Self {
        Schema::new(iter)
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (idx, field) in self.fields.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", field.name, field.datatype)?;
        }
        write!(f, "]")
    }
}

/// Build a not found error for a column, including the most similar
/// existing name if one is close enough.
pub fn column_not_found<'a>(name: &str, candidates: impl Iterator<Item = &'a str>) -> DbError {
    const SIMILARITY_THRESHOLD: f64 = 0.7;

    let mut best: Option<(f64, &str)> = None;
    for candidate in candidates {
        let score = strsim::jaro(candidate, name);
        if score > SIMILARITY_THRESHOLD && best.is_none_or(|(s, _)| score > s) {
            best = Some((score, candidate));
        }
    }

    let err = DbError::not_found(format!("Missing column '{name}'"));
    match best {
        Some((_, similar)) => err.with_field("did you mean", similar.to_string()),
        None => err,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use floe_error::ErrorKind;

    #[test]
    fn missing_column_suggestion() {
        let schema = Schema::new([
            Field::new("price", DataType::Float64),
            Field::new("quantity", DataType::Int64),
        ]);
        let err = schema.try_get("prices").unwrap_err();
        assert_eq!(ErrorKind::NotFound, err.kind());
        assert_eq!(
            Some("price"),
            err.fields()
                .find(|(k, _)| *k == "did you mean")
                .map(|(_, v)| v)
        );
    }

    #[test]
    fn upsert_replaces_in_place() {
        let mut schema = Schema::new([
            Field::new("a", DataType::Int64),
            Field::new("b", DataType::Utf8),
        ]);
        schema.upsert(Field::new("a", DataType::Float64));
        schema.upsert(Field::new("c", DataType::Boolean));
        assert_eq!(vec!["a", "b", "c"], schema.names().collect::<Vec<_>>());
        assert_eq!(DataType::Float64, schema.fields[0].datatype);
    }
}
