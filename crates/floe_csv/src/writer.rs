use std::io::Write;

use csv_core::WriteResult;
use floe_core::arrays::scalar::ScalarValue;
use floe_core::frame::Table;
use floe_error::{Result, ResultExt};
use tracing::debug;

use crate::dialect::DialectOptions;

const OUTPUT_BUFFER_SIZE: usize = 8 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvWriteOptions {
    pub delimiter: u8,
    /// Write column names as the first record.
    pub include_header: bool,
}

impl Default for CsvWriteOptions {
    fn default() -> Self {
        CsvWriteOptions {
            delimiter: b',',
            include_header: true,
        }
    }
}

/// Write a table as comma separated values with a header line.
pub fn write_csv(table: &Table, writer: impl Write) -> Result<()> {
    write_csv_with(table, writer, &CsvWriteOptions::default())
}

/// Write a table to an in-memory string.
pub fn write_csv_string(table: &Table) -> Result<String> {
    let mut buf = Vec::new();
    write_csv(table, &mut buf)?;
    String::from_utf8(buf).context("csv output is not valid utf8")
}

/// Write a table as csv.
///
/// Fields are only quoted when needed. Nulls are written as empty fields and
/// empty strings as `""`, every other value as its display string.
pub fn write_csv_with(table: &Table, writer: impl Write, options: &CsvWriteOptions) -> Result<()> {
    if table.width() == 0 {
        return Ok(());
    }

    let dialect = DialectOptions {
        delimiter: options.delimiter,
        ..DialectOptions::default()
    };
    let mut out = RecordWriter::new(&dialect, writer);

    if options.include_header {
        for (idx, name) in table.column_names().into_iter().enumerate() {
            if idx > 0 {
                out.delimiter()?;
            }
            out.field(name.as_bytes())?;
        }
        out.terminator()?;
    }

    // Single column records that are entirely empty are quoted by the
    // terminator.
    let quote_empty = table.width() > 1;

    // Buffer used for formatting a single value.
    let mut format_buf: Vec<u8> = Vec::with_capacity(64);
    let mut columns: Vec<_> = table.columns().iter().map(|c| c.iter()).collect();

    for _ in 0..table.height() {
        for (idx, column) in columns.iter_mut().enumerate() {
            if idx > 0 {
                out.delimiter()?;
            }
            match column.next() {
                Some(ScalarValue::Null) | None => (),
                Some(ScalarValue::Utf8(s)) if s.is_empty() => {
                    if quote_empty {
                        out.quoted_empty()?;
                    }
                }
                Some(value) => {
                    format_buf.clear();
                    write!(&mut format_buf, "{value}").context("failed to format value")?;
                    out.field(&format_buf)?;
                }
            }
        }
        out.terminator()?;
    }

    out.finish()?;
    debug!(rows = table.height(), columns = table.width(), "wrote csv");

    Ok(())
}

/// Encodes records into a fixed size buffer, writing the buffer out
/// whenever it fills up.
struct RecordWriter<W> {
    encoder: csv_core::Writer,
    quote: u8,
    writer: W,
    buf: Vec<u8>,
    len: usize,
}

impl<W: Write> RecordWriter<W> {
    fn new(dialect: &DialectOptions, writer: W) -> Self {
        RecordWriter {
            encoder: dialect.csv_core_writer(),
            quote: dialect.quote,
            writer,
            buf: vec![0; OUTPUT_BUFFER_SIZE],
            len: 0,
        }
    }

    /// Write a complete field, quoting it if it contains special bytes.
    fn field(&mut self, mut input: &[u8]) -> Result<()> {
        loop {
            let (res, nin, nout) = self.encoder.field(input, &mut self.buf[self.len..]);
            input = &input[nin..];
            self.len += nout;
            match res {
                WriteResult::InputEmpty => return Ok(()),
                WriteResult::OutputFull => self.flush_buf()?,
            }
        }
    }

    /// Write an empty field as a pair of quotes.
    fn quoted_empty(&mut self) -> Result<()> {
        if self.buf.len() - self.len < 2 {
            self.flush_buf()?;
        }
        self.buf[self.len] = self.quote;
        self.buf[self.len + 1] = self.quote;
        self.len += 2;
        Ok(())
    }

    fn delimiter(&mut self) -> Result<()> {
        self.encode(|encoder, out| encoder.delimiter(out))
    }

    fn terminator(&mut self) -> Result<()> {
        self.encode(|encoder, out| encoder.terminator(out))
    }

    fn finish(mut self) -> Result<()> {
        self.encode(|encoder, out| encoder.finish(out))?;
        self.flush_buf()?;
        self.writer.flush().context("failed to flush")
    }

    fn encode(&mut self, mut f: impl FnMut(&mut csv_core::Writer, &mut [u8]) -> (WriteResult, usize)) -> Result<()> {
        loop {
            let (res, nout) = f(&mut self.encoder, &mut self.buf[self.len..]);
            self.len += nout;
            match res {
                WriteResult::InputEmpty => return Ok(()),
                WriteResult::OutputFull => self.flush_buf()?,
            }
        }
    }

    fn flush_buf(&mut self) -> Result<()> {
        self.writer
            .write_all(&self.buf[..self.len])
            .context("failed to write csv output")?;
        self.len = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use floe_core::column::Column;
    use floe_core::testutil::assert_tables_eq;

    use super::*;
    use crate::reader::CsvReader;

    fn table() -> Table {
        Table::try_new(vec![
            Column::from_slice("foo", &[1i64, 2, 3, 4, 5]),
            Column::from_slice("bar", &[6i64, 7, 8, 9, 10]),
            Column::from_strs("ham", &["a", "b", "c", "d", "e"]),
        ])
        .unwrap()
    }

    #[test]
    fn write_simple() {
        let out = write_csv_string(&table()).unwrap();
        assert_eq!("foo,bar,ham\n1,6,a\n2,7,b\n3,8,c\n4,9,d\n5,10,e\n", out);
    }

    #[test]
    fn round_trip() {
        let table = table();
        let out = write_csv_string(&table).unwrap();
        let read = CsvReader::from_bytes(out.into_bytes()).finish().unwrap();
        assert_tables_eq(&table, &read);
    }

    #[test]
    fn nulls_and_quoting() {
        let table = Table::try_new(vec![
            Column::from_opt("a", vec![Some(1.5f64), None]),
            Column::from_strs("b", &["x,y", "say \"hi\""]),
        ])
        .unwrap();
        let out = write_csv_string(&table).unwrap();
        assert_eq!("a,b\n1.5,\"x,y\"\n,\"say \"\"hi\"\"\"\n", out);
    }

    #[test]
    fn empty_strings_round_trip() {
        let table = Table::try_new(vec![
            Column::from_strs("a", &["x", ""]),
            Column::from_opt("b", vec![None, Some(2i64)]),
        ])
        .unwrap();
        let out = write_csv_string(&table).unwrap();
        assert_eq!("a,b\nx,\n\"\",2\n", out);

        let read = CsvReader::from_bytes(out.into_bytes()).finish().unwrap();
        assert_eq!(
            vec![ScalarValue::from("x"), ScalarValue::from("")],
            read.column("a").unwrap().to_scalars()
        );
        assert_tables_eq(&table, &read);
    }

    #[test]
    fn long_values_span_buffer_flushes() {
        let long = "ab,\"c".repeat(OUTPUT_BUFFER_SIZE);
        let table = Table::try_new(vec![Column::from_strs("s", &[long.as_str(), "d"])]).unwrap();
        let out = write_csv_string(&table).unwrap();
        let read = CsvReader::from_bytes(out.into_bytes()).finish().unwrap();
        assert_tables_eq(&table, &read);
    }

    #[test]
    fn options() {
        let mut buf = Vec::new();
        let options = CsvWriteOptions {
            delimiter: b'|',
            include_header: false,
        };
        write_csv_with(&table().head(2), &mut buf, &options).unwrap();
        assert_eq!("1|6|a\n2|7|b\n", String::from_utf8(buf).unwrap());
    }

    #[test]
    fn header_only_and_empty() {
        let out = write_csv_string(&table().head(0)).unwrap();
        assert_eq!("foo,bar,ham\n", out);

        let out = write_csv_string(&Table::empty()).unwrap();
        assert_eq!("", out);
    }
}
