//! Reading and writing tables as CSV.

pub mod dialect;
pub mod inference;
pub mod reader;
pub mod writer;

pub use self::dialect::DialectOptions;
pub use self::reader::{CsvReadOptions, CsvReader, read_csv_schema};
pub use self::writer::{CsvWriteOptions, write_csv, write_csv_string, write_csv_with};
