use std::sync::Arc;

use floe_core::prelude::*;
use floe_csv::{CsvReader, write_csv};

const INPUT: &str = "city,temp,day\noslo,-3.5,2024-01-02\nlima,22,2024-01-02\noslo,-1,2024-01-03\nrome,,2024-01-03\n";

#[test]
fn lazy_scan_over_csv() {
    logutil::init_test();

    let reader = CsvReader::from_bytes(INPUT.as_bytes());
    let out = LazyFrame::scan_source(Arc::new(reader))
        .filter(col("city").eq(lit("oslo")))
        .groupby([col("city")])
        .agg([col("temp").mean().alias("mean_temp")])
        .collect()
        .unwrap();

    assert_eq!((1, 2), out.shape());
    assert_eq!(
        vec![Some(-2.25)],
        out.column("mean_temp").unwrap().native_values::<f64>().unwrap()
    );
}

#[test]
fn schema_from_csv() {
    logutil::init_test();

    let reader = CsvReader::from_bytes(INPUT.as_bytes());
    let schema = LazyFrame::scan_source(Arc::new(reader)).schema().unwrap();
    assert_eq!(
        vec![DataType::Utf8, DataType::Float64, DataType::Date],
        schema.datatypes().cloned().collect::<Vec<_>>()
    );
}

#[test]
fn write_after_query() {
    logutil::init_test();

    let table = CsvReader::from_bytes(INPUT.as_bytes()).finish().unwrap();
    let out = table
        .lazy()
        .filter(col("temp").is_not_null())
        .sort(&["temp"], &[true], false)
        .select([col("city"), col("temp")])
        .collect()
        .unwrap();

    let mut buf = Vec::new();
    write_csv(&out, &mut buf).unwrap();
    assert_eq!("city,temp\nlima,22.0\noslo,-1.0\noslo,-3.5\n", String::from_utf8(buf).unwrap());
}
