use std::borrow::Cow;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use csv::StringRecord;
use floe_core::arrays::datatype::{DataType, Field};
use floe_core::arrays::scalar::ScalarValue;
use floe_core::arrays::schema::{Schema, column_not_found};
use floe_core::column::Column;
use floe_core::frame::Table;
use floe_core::frame::construct::default_name;
use floe_core::source::TableSource;
use floe_error::{DbError, Result, ResultExt};
use hashbrown::HashSet;
use tracing::debug;

use crate::dialect::DialectOptions;
use crate::inference::{infer_type, parse_field};

/// Number of records used for type inference by default.
pub const DEFAULT_INFER_SCHEMA_ROWS: usize = 100;

/// Bytes read from the start of the input when sniffing the delimiter.
const SNIFF_BYTES: u64 = 16 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvReadOptions {
    /// Whether the first record holds column names.
    pub has_header: bool,
    /// Field delimiter. Inferred from the start of the input when `None`.
    pub delimiter: Option<u8>,
    pub quote: u8,
    /// Number of records looked at when inferring column types.
    pub infer_schema_rows: usize,
}

impl Default for CsvReadOptions {
    fn default() -> Self {
        CsvReadOptions {
            has_header: true,
            delimiter: Some(b','),
            quote: b'"',
            infer_schema_rows: DEFAULT_INFER_SCHEMA_ROWS,
        }
    }
}

#[derive(Clone)]
enum CsvInput {
    Path(PathBuf),
    Bytes(Arc<[u8]>),
}

impl fmt::Debug for CsvInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
        }
    }
}

impl CsvInput {
    fn open(&self) -> Result<Box<dyn Read + '_>> {
        Ok(match self {
            Self::Path(path) => Box::new(
                File::open(path).context_fn(|| format!("failed to open {}", path.display()))?,
            ),
            Self::Bytes(bytes) => Box::new(&bytes[..]),
        })
    }

    /// The whole input. Files are read into memory, buffers are borrowed.
    fn bytes(&self) -> Result<Cow<'_, [u8]>> {
        Ok(match self {
            Self::Path(path) => Cow::Owned(
                std::fs::read(path).context_fn(|| format!("failed to read {}", path.display()))?,
            ),
            Self::Bytes(bytes) => Cow::Borrowed(&bytes[..]),
        })
    }

    fn sample(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.open()?
            .take(SNIFF_BYTES)
            .read_to_end(&mut buf)
            .context("failed to read csv sample")?;
        Ok(buf)
    }
}

/// Reads csv from a file or an in-memory buffer.
///
/// Column types are inferred from the first
/// [`CsvReadOptions::infer_schema_rows`] records unless a schema is given.
/// Empty fields read as null, except for `""` in string columns which reads
/// as an empty string.
#[derive(Debug, Clone)]
pub struct CsvReader {
    input: CsvInput,
    options: CsvReadOptions,
    schema: Option<Schema>,
}

impl CsvReader {
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        Self::new(CsvInput::Path(path.as_ref().to_path_buf()))
    }

    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self::new(CsvInput::Bytes(bytes.into()))
    }

    fn new(input: CsvInput) -> Self {
        CsvReader {
            input,
            options: CsvReadOptions::default(),
            schema: None,
        }
    }

    pub fn with_options(mut self, options: CsvReadOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_header(mut self, has_header: bool) -> Self {
        self.options.has_header = has_header;
        self
    }

    /// Set the delimiter. `None` infers it from the input.
    pub fn with_delimiter(mut self, delimiter: Option<u8>) -> Self {
        self.options.delimiter = delimiter;
        self
    }

    pub fn with_infer_schema_rows(mut self, rows: usize) -> Self {
        self.options.infer_schema_rows = rows;
        self
    }

    /// Skip inference and use this schema. Fields are matched to csv
    /// columns by position.
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn options(&self) -> &CsvReadOptions {
        &self.options
    }

    /// Read the whole input into a table.
    pub fn finish(&self) -> Result<Table> {
        self.read(None)
    }

    fn dialect(&self) -> Result<DialectOptions> {
        match self.options.delimiter {
            Some(delimiter) => Ok(DialectOptions {
                delimiter,
                quote: self.options.quote,
            }),
            None => {
                let sample = self.input.sample()?;
                let dialect = DialectOptions::infer_from_sample(&sample).unwrap_or_default();
                debug!(?dialect, "inferred csv dialect");
                Ok(dialect)
            }
        }
    }

    /// Read the header if there is one, followed by at most `limit` records.
    fn read_records(
        &self,
        dialect: &DialectOptions,
        limit: Option<usize>,
    ) -> Result<(Option<StringRecord>, Vec<StringRecord>)> {
        let mut reader = dialect.reader_builder().from_reader(self.input.open()?);
        let mut records = reader.records();

        let header = if self.options.has_header {
            records.next().transpose().context("failed to read csv header")?
        } else {
            None
        };

        let records = records
            .take(limit.unwrap_or(usize::MAX))
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to read csv record")?;

        Ok((header, records))
    }

    /// Cells holding a quoted empty string, as sorted `(row, column)` pairs.
    ///
    /// Parsed records don't keep track of quoting, so rows with empty fields
    /// are looked up again in the raw input.
    fn quoted_empty_cells(&self, dialect: &DialectOptions, records: &[StringRecord]) -> Result<Vec<(usize, usize)>> {
        let rows: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, record)| record.iter().any(str::is_empty))
            .map(|(row, _)| row)
            .collect();
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let data = self.input.bytes()?;
        let mut cells = Vec::new();
        for row in rows {
            let Some(position) = records[row].position() else {
                continue;
            };
            let start = usize::try_from(position.byte()).unwrap_or(usize::MAX);
            if let Some(raw) = data.get(start..) {
                cells.extend(dialect.quoted_empty_fields(raw).into_iter().map(|col| (row, col)));
            }
        }
        Ok(cells)
    }

    fn resolve_schema(&self, header: Option<&StringRecord>, sample: &[StringRecord]) -> Result<Schema> {
        let width = header
            .map(|h| h.len())
            .or_else(|| sample.first().map(|r| r.len()))
            .unwrap_or(0);

        if let Some(schema) = &self.schema {
            if width != 0 && schema.len() != width {
                return Err(DbError::schema("Schema does not match number of csv columns")
                    .with_field("schema", schema.len())
                    .with_field("columns", width));
            }
            return Ok(schema.clone());
        }

        let names = column_names(header, width);
        {
            let mut seen = HashSet::new();
            if let Some(dup) = names.iter().find(|name| !seen.insert(name.as_str())) {
                return Err(DbError::duplicate("Duplicate column name in csv header").with_field("name", dup));
            }
        }

        Ok(names
            .into_iter()
            .enumerate()
            .map(|(idx, name)| {
                let datatype = infer_type(sample.iter().map(|r| r.get(idx).unwrap_or("")));
                Field::new(name, datatype)
            })
            .collect())
    }
}

impl TableSource for CsvReader {
    fn name(&self) -> &str {
        "csv"
    }

    fn schema(&self) -> Result<Schema> {
        let dialect = self.dialect()?;
        let (header, sample) = self.read_records(&dialect, Some(self.options.infer_schema_rows))?;
        self.resolve_schema(header.as_ref(), &sample)
    }

    fn read(&self, projection: Option<&[String]>) -> Result<Table> {
        let dialect = self.dialect()?;
        let (header, records) = self.read_records(&dialect, None)?;
        let sample = &records[..records.len().min(self.options.infer_schema_rows)];
        let schema = self.resolve_schema(header.as_ref(), sample)?;

        let indices: Vec<usize> = match projection {
            Some(names) => names
                .iter()
                .map(|name| {
                    schema
                        .index_of(name)
                        .ok_or_else(|| column_not_found(name, schema.names()))
                })
                .collect::<Result<_>>()?,
            None => (0..schema.len()).collect(),
        };

        let quoted_empty = self.quoted_empty_cells(&dialect, &records)?;
        let columns = indices
            .into_iter()
            .map(|idx| decode_column(&schema.fields[idx], idx, &records, &quoted_empty))
            .collect::<Result<Vec<_>>>()?;

        debug!(rows = records.len(), columns = columns.len(), "read csv");
        Table::try_new(columns)
    }
}

fn column_names(header: Option<&StringRecord>, width: usize) -> Vec<String> {
    (0..width)
        .map(|idx| match header.and_then(|h| h.get(idx)) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => default_name(idx),
        })
        .collect()
}

fn decode_column(
    field: &Field,
    idx: usize,
    records: &[StringRecord],
    quoted_empty: &[(usize, usize)],
) -> Result<Column> {
    let values = records
        .iter()
        .enumerate()
        .map(|(row, record)| {
            let raw = record.get(idx).unwrap_or("");
            if raw.is_empty() {
                let keep = field.datatype == DataType::Utf8 && quoted_empty.binary_search(&(row, idx)).is_ok();
                return Ok(if keep { ScalarValue::Utf8(String::new()) } else { ScalarValue::Null });
            }
            parse_field(raw, &field.datatype).ok_or_else(|| {
                DbError::new("Failed to parse csv field")
                    .with_field("row", row)
                    .with_field("column", &field.name)
                    .with_field("datatype", &field.datatype)
                    .with_field("value", raw)
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Column::from_scalars(field.name.clone(), &field.datatype, &values)
}

/// Infer the schema of a csv file without reading more than the inference
/// sample.
pub fn read_csv_schema(path: impl AsRef<Path>) -> Result<Schema> {
    CsvReader::from_path(path).schema()
}

#[cfg(test)]
mod tests {
    use floe_core::arrays::datatype::TimeUnit;
    use floe_error::ErrorKind;

    use super::*;

    fn reader(input: &str) -> CsvReader {
        CsvReader::from_bytes(input.as_bytes())
    }

    fn strings(table: &Table, name: &str) -> Vec<ScalarValue> {
        table.column(name).unwrap().to_scalars()
    }

    #[test]
    fn read_with_header() {
        let table = reader("a,b,c,d\n1,2.5,x,true\n2,3,y,false\n").finish().unwrap();
        assert_eq!((2, 4), table.shape());
        let schema = table.schema();
        assert_eq!(
            vec![DataType::Int64, DataType::Float64, DataType::Utf8, DataType::Boolean],
            schema.datatypes().cloned().collect::<Vec<_>>()
        );
        assert_eq!(vec![Some(1), Some(2)], table.column("a").unwrap().native_values::<i64>().unwrap());
        assert_eq!(vec![Some(2.5), Some(3.0)], table.column("b").unwrap().native_values::<f64>().unwrap());
    }

    #[test]
    fn empty_fields_are_null() {
        let table = reader("a,b\n1,\n,y\n").finish().unwrap();
        assert_eq!(vec![Some(1), None], table.column("a").unwrap().native_values::<i64>().unwrap());
        assert_eq!(
            vec![ScalarValue::Null, ScalarValue::Utf8("y".to_string())],
            strings(&table, "b")
        );
    }

    #[test]
    fn quoted_empty_is_empty_string() {
        let table = reader("a,b,c\n\"\",1,\"\"\n,2,x\nz,\"\",\"\"\n").finish().unwrap();
        assert_eq!(
            vec![ScalarValue::from(""), ScalarValue::Null, ScalarValue::from("z")],
            strings(&table, "a")
        );
        // Only string columns keep the empty value.
        assert_eq!(vec![Some(1), Some(2), None], table.column("b").unwrap().native_values::<i64>().unwrap());
        assert_eq!(
            vec![ScalarValue::from(""), ScalarValue::from("x"), ScalarValue::from("")],
            strings(&table, "c")
        );
    }

    #[test]
    fn no_header_default_names() {
        let table = reader("1,a\n2,b\n").with_header(false).finish().unwrap();
        assert_eq!(vec!["column_0", "column_1"], table.column_names());
        assert_eq!(2, table.height());
    }

    #[test]
    fn missing_header_name() {
        let schema = reader("a,,c\n1,2,3\n").schema().unwrap();
        assert_eq!(vec!["a", "column_1", "c"], schema.names().collect::<Vec<_>>());
    }

    #[test]
    fn temporal_inference() {
        let table = reader("d,ts\n2021-01-01,2021-01-01 10:00:00\n2021-01-02,2021-01-02\n")
            .finish()
            .unwrap();
        assert_eq!(&DataType::Date, table.column("d").unwrap().datatype());
        assert_eq!(
            &DataType::Datetime(TimeUnit::Microseconds),
            table.column("ts").unwrap().datatype()
        );
    }

    #[test]
    fn sniff_delimiter() {
        let table = reader("a;b\n1;2\n3;4\n").with_delimiter(None).finish().unwrap();
        assert_eq!(vec!["a", "b"], table.column_names());
        assert_eq!(vec![Some(2), Some(4)], table.column("b").unwrap().native_values::<i64>().unwrap());
    }

    #[test]
    fn quoted_fields() {
        let table = reader("a,b\n\"x,y\",1\n\"say \"\"hi\"\"\",2\n").finish().unwrap();
        assert_eq!(
            vec![
                ScalarValue::Utf8("x,y".to_string()),
                ScalarValue::Utf8("say \"hi\"".to_string())
            ],
            strings(&table, "a")
        );
    }

    #[test]
    fn projection() {
        let source = reader("a,b,c\n1,2,3\n");
        let table = source.read(Some(&["c".to_string(), "a".to_string()])).unwrap();
        assert_eq!(vec!["c", "a"], table.column_names());

        let err = source.read(Some(&["bb".to_string()])).unwrap_err();
        assert_eq!(ErrorKind::NotFound, err.kind());
    }

    #[test]
    fn schema_reads_sample_only() {
        // Third record doesn't fit the inferred type, but isn't in the sample.
        let source = reader("a\n1\n2\nx\n").with_infer_schema_rows(2);
        let schema = source.schema().unwrap();
        assert_eq!(DataType::Int64, schema.try_get("a").unwrap().datatype);
        assert!(source.finish().is_err());
    }

    #[test]
    fn schema_override() {
        let schema = Schema::new([Field::new("x", DataType::Utf8), Field::new("y", DataType::Float64)]);
        let table = reader("a,b\n1,2\n").with_schema(schema.clone()).finish().unwrap();
        assert_eq!(schema, table.schema());
        assert_eq!(vec![ScalarValue::Utf8("1".to_string())], strings(&table, "x"));

        let bad = Schema::new([Field::new("x", DataType::Utf8)]);
        let err = reader("a,b\n1,2\n").with_schema(bad).finish().unwrap_err();
        assert_eq!(ErrorKind::Schema, err.kind());
    }

    #[test]
    fn ragged_records_error() {
        assert!(reader("a,b\n1,2\n3\n").finish().is_err());
    }

    #[test]
    fn duplicate_header_errors() {
        let err = reader("a,a\n1,2\n").finish().unwrap_err();
        assert_eq!(ErrorKind::Duplicate, err.kind());
    }

    #[test]
    fn header_only() {
        let table = reader("a,b\n").finish().unwrap();
        assert_eq!((0, 2), table.shape());
        assert_eq!(&DataType::Utf8, table.column("a").unwrap().datatype());
    }

    #[test]
    fn read_from_path() {
        let path = std::env::temp_dir().join(format!("floe_csv_read_{}.csv", std::process::id()));
        std::fs::write(&path, "a,b\n1,x\n").unwrap();
        let schema = read_csv_schema(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(vec!["a", "b"], schema.names().collect::<Vec<_>>());

        assert!(read_csv_schema(&path).is_err());
    }
}
