//! String kernels. Categorical columns are accepted and treated as their
//! string values.

use floe_error::{DbError, Result, ResultExt};
use regex::Regex;

use super::Column;
use crate::arrays::array::Array;
use crate::arrays::datatype::DataType;

fn string_values(col: &Column) -> Result<Vec<Option<String>>> {
    match col.datatype() {
        DataType::Utf8 | DataType::Categorical | DataType::Null => Ok(col
            .iter()
            .map(|v| v.try_as_str().map(|s| s.to_string()))
            .collect()),
        other => Err(DbError::schema("Expected a string column")
            .with_field("column", col.name())
            .with_field("datatype", other)),
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).context_fn(|| format!("Invalid regex pattern: {pattern}"))
}

fn map_strings(col: &Column, f: impl Fn(&str) -> Option<String>) -> Result<Column> {
    let values = string_values(col)?
        .into_iter()
        .map(|v| v.and_then(|s| f(&s)))
        .collect();
    Ok(Column::new(col.name(), Array::from_strings_opt(values)))
}

fn test_strings(col: &Column, f: impl Fn(&str) -> bool) -> Result<Column> {
    let values = string_values(col)?
        .into_iter()
        .map(|v| v.map(|s| f(&s)))
        .collect();
    Ok(Column::new(col.name(), Array::from_bools_opt(values)))
}

impl Column {
    /// Number of characters in each string.
    pub fn str_lengths(&self) -> Result<Column> {
        let values = string_values(self)?
            .into_iter()
            .map(|v| v.map(|s| s.chars().count() as u32))
            .collect();
        Ok(Column::new(self.name(), Array::from_native_opt::<u32>(values)))
    }

    pub fn str_contains(&self, pattern: &str) -> Result<Column> {
        let re = compile(pattern)?;
        test_strings(self, |s| re.is_match(s))
    }

    pub fn str_starts_with(&self, prefix: &str) -> Result<Column> {
        test_strings(self, |s| s.starts_with(prefix))
    }

    pub fn str_ends_with(&self, suffix: &str) -> Result<Column> {
        test_strings(self, |s| s.ends_with(suffix))
    }

    pub fn str_to_uppercase(&self) -> Result<Column> {
        map_strings(self, |s| Some(s.to_uppercase()))
    }

    pub fn str_to_lowercase(&self) -> Result<Column> {
        map_strings(self, |s| Some(s.to_lowercase()))
    }

    /// Replace the first (or every) match of a pattern.
    pub fn str_replace(&self, pattern: &str, value: &str, all: bool) -> Result<Column> {
        let re = compile(pattern)?;
        map_strings(self, |s| {
            Some(if all {
                re.replace_all(s, value).into_owned()
            } else {
                re.replace(s, value).into_owned()
            })
        })
    }

    /// Extract a capture group from the first match. Non matching strings
    /// produce null.
    pub fn str_extract(&self, pattern: &str, group: usize) -> Result<Column> {
        let re = compile(pattern)?;
        if group >= re.captures_len() {
            return Err(DbError::invalid_argument("Capture group out of range")
                .with_field("pattern", pattern)
                .with_field("group", group));
        }
        map_strings(self, |s| {
            re.captures(s)
                .and_then(|caps| caps.get(group))
                .map(|m| m.as_str().to_string())
        })
    }

    /// Every match of a pattern as a list of strings. Strings without a
    /// match produce null.
    pub fn str_extract_all(&self, pattern: &str) -> Result<Column> {
        let re = compile(pattern)?;
        let parts = string_values(self)?
            .into_iter()
            .map(|v| {
                let matches: Vec<&str> = v.as_deref().map(|s| re.find_iter(s).map(|m| m.as_str()).collect())?;
                (!matches.is_empty()).then(|| Column::from_strs(self.name(), &matches))
            })
            .collect();
        Column::from_list_parts(self.name(), Some(&DataType::Utf8), parts)
    }

    /// Pad with zeros on the left to `width` characters. A leading sign
    /// stays in front of the padding.
    pub fn str_zfill(&self, width: usize) -> Result<Column> {
        map_strings(self, |s| {
            let len = s.chars().count();
            if len >= width {
                return Some(s.to_string());
            }
            let pad = "0".repeat(width - len);
            Some(match s.strip_prefix(['-', '+']) {
                Some(rest) => format!("{}{pad}{rest}", &s[..1]),
                None => format!("{pad}{s}"),
            })
        })
    }

    /// Left align to `width` characters, padding on the right.
    pub fn str_ljust(&self, width: usize, fill: char) -> Result<Column> {
        map_strings(self, |s| {
            let pad = width.saturating_sub(s.chars().count());
            Some(format!("{s}{}", fill.to_string().repeat(pad)))
        })
    }

    /// Right align to `width` characters, padding on the left.
    pub fn str_rjust(&self, width: usize, fill: char) -> Result<Column> {
        map_strings(self, |s| {
            let pad = width.saturating_sub(s.chars().count());
            Some(format!("{}{s}", fill.to_string().repeat(pad)))
        })
    }

    /// Join all non-null strings into a single value.
    pub fn str_concat(&self, delimiter: &str) -> Result<Column> {
        let joined = string_values(self)?
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(delimiter);
        Ok(Column::from_strs(self.name(), &[joined.as_str()]))
    }
}

#[cfg(test)]
mod tests {
    use floe_error::ErrorKind;

    use super::*;
    use crate::arrays::scalar::ScalarValue;

    fn names() -> Column {
        Column::new(
            "s",
            Array::from_strings_opt(vec![
                Some("foo123".to_string()),
                None,
                Some("Ham".to_string()),
            ]),
        )
    }

    #[test]
    fn lengths_count_chars() {
        let col = Column::from_strs("s", &["héllo", ""]);
        assert_eq!(
            vec![ScalarValue::UInt32(5), ScalarValue::UInt32(0)],
            col.str_lengths().unwrap().to_scalars()
        );
    }

    #[test]
    fn contains_regex() {
        assert_eq!(
            vec![Some(true), None, Some(false)],
            names().str_contains(r"\d+").unwrap().bool_values().unwrap()
        );
    }

    #[test]
    fn replace_and_extract() {
        let replaced = names().str_replace(r"\d", "#", true).unwrap();
        assert_eq!(ScalarValue::from("foo###"), replaced.get(0).unwrap());
        let first = names().str_replace(r"\d", "#", false).unwrap();
        assert_eq!(ScalarValue::from("foo#23"), first.get(0).unwrap());

        let extracted = names().str_extract(r"([a-z]+)(\d+)", 2).unwrap();
        assert_eq!(
            vec![ScalarValue::from("123"), ScalarValue::Null, ScalarValue::Null],
            extracted.to_scalars()
        );
    }

    #[test]
    fn case_and_affixes() {
        let col = names();
        assert_eq!(ScalarValue::from("HAM"), col.str_to_uppercase().unwrap().get(2).unwrap());
        assert_eq!(ScalarValue::from("ham"), col.str_to_lowercase().unwrap().get(2).unwrap());
        assert_eq!(
            vec![Some(true), None, Some(false)],
            col.str_starts_with("foo").unwrap().bool_values().unwrap()
        );
        assert_eq!(
            vec![Some(false), None, Some(true)],
            col.str_ends_with("am").unwrap().bool_values().unwrap()
        );
    }

    #[test]
    fn extract_all_matches() {
        let col = Column::from_strs("foo", &["123 bla 45 asd", "xyz 678 910t"]);
        let out = col.str_extract_all("a").unwrap();
        assert_eq!(&DataType::list(DataType::Utf8), out.datatype());
        assert_eq!(
            vec![
                ScalarValue::List(vec![ScalarValue::from("a"), ScalarValue::from("a")]),
                ScalarValue::Null,
            ],
            out.to_scalars()
        );

        let digits = names().str_extract_all(r"\d").unwrap();
        assert_eq!(ScalarValue::Null, digits.get(1).unwrap());
    }

    #[test]
    fn zfill_keeps_sign_in_front() {
        let col = Column::new(
            "n",
            Array::from_strings_opt(
                ["-10", "-1", "0", "10", "+7", "100000"]
                    .iter()
                    .map(|s| Some(s.to_string()))
                    .chain([None])
                    .collect(),
            ),
        );
        assert_eq!(
            vec![
                ScalarValue::from("-0010"),
                ScalarValue::from("-0001"),
                ScalarValue::from("00000"),
                ScalarValue::from("00010"),
                ScalarValue::from("+0007"),
                ScalarValue::from("100000"),
                ScalarValue::Null,
            ],
            col.str_zfill(5).unwrap().to_scalars()
        );
    }

    #[test]
    fn justify() {
        let col = Column::from_strs("a", &["foo", "longer_foo", "longest_fooooooo", "hi"]);
        let right = col.str_rjust(10, ' ').unwrap();
        assert_eq!(
            vec![
                ScalarValue::from("       foo"),
                ScalarValue::from("longer_foo"),
                ScalarValue::from("longest_fooooooo"),
                ScalarValue::from("        hi"),
            ],
            right.to_scalars()
        );
        assert_eq!(
            vec![Some(10), Some(10), Some(16), Some(10)],
            right.str_lengths().unwrap().native_values::<u32>().unwrap()
        );
        let left = col.str_ljust(4, '*').unwrap();
        assert_eq!(ScalarValue::from("foo*"), left.get(0).unwrap());
        assert_eq!(ScalarValue::from("hi**"), left.get(3).unwrap());
    }

    #[test]
    fn concat_skips_nulls() {
        let out = names().str_concat("-").unwrap();
        assert_eq!(vec![ScalarValue::from("foo123-Ham")], out.to_scalars());
        let empty = Column::from_strs("s", &[]).str_concat(",").unwrap();
        assert_eq!(vec![ScalarValue::from("")], empty.to_scalars());
    }

    #[test]
    fn bad_input() {
        let err = names().str_contains("(").unwrap_err();
        assert_eq!(ErrorKind::Compute, err.kind());
        let err = Column::from_slice("a", &[1i64]).str_lengths().unwrap_err();
        assert_eq!(ErrorKind::Schema, err.kind());
    }
}
