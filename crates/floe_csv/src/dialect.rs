use std::fmt;

/// Delimiter and quote settings for reading or writing csv.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct DialectOptions {
    /// Delimiter character.
    pub delimiter: u8,
    /// Quote character.
    pub quote: u8,
}

impl Default for DialectOptions {
    fn default() -> Self {
        DialectOptions {
            delimiter: b',',
            quote: b'"',
        }
    }
}

impl fmt::Debug for DialectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialectOptions")
            .field("delimiter", &(self.delimiter as char))
            .field("quote", &(self.quote as char))
            .finish()
    }
}

impl DialectOptions {
    /// Try to infer which dialect to use from a sample of a csv source.
    ///
    /// A dialect is only picked if it splits at least two records into at
    /// least two fields each, with every record in the sample having the
    /// same number of fields. The dialect producing the most fields wins.
    pub fn infer_from_sample(sample: &[u8]) -> Option<Self> {
        // Best dialect chosen so far alongside number of fields decoded.
        let mut best: (Option<Self>, usize) = (None, 0);

        for dialect in Self::dialects() {
            let mut reader = dialect.reader_builder().flexible(true).from_reader(sample);
            let mut counts = Vec::new();
            for record in reader.byte_records() {
                match record {
                    Ok(record) => counts.push(record.len()),
                    // Sample may end mid record.
                    Err(_) => break,
                }
            }
            // Last record may be truncated by the sample boundary.
            if counts.len() > 2 {
                counts.pop();
            }

            if counts.len() < 2 {
                continue;
            }
            let num_fields = counts[0];
            if num_fields < 2 || num_fields <= best.1 {
                continue;
            }
            if counts.iter().any(|&n| n != num_fields) {
                continue;
            }

            best = (Some(*dialect), num_fields);
        }

        best.0
    }

    pub(crate) fn reader_builder(&self) -> csv::ReaderBuilder {
        let mut builder = csv::ReaderBuilder::new();
        builder.delimiter(self.delimiter).quote(self.quote).has_headers(false);
        builder
    }

    pub(crate) fn csv_core_writer(&self) -> csv_core::Writer {
        csv_core::WriterBuilder::new()
            .delimiter(self.delimiter)
            .quote(self.quote)
            .quote_style(csv_core::QuoteStyle::Necessary)
            .terminator(csv_core::Terminator::Any(b'\n'))
            .build()
    }

    /// Indices of the fields written as `""` in the raw record starting at
    /// the beginning of `raw`. Scanning stops at the first unquoted line
    /// break.
    pub(crate) fn quoted_empty_fields(&self, raw: &[u8]) -> Vec<usize> {
        let start = raw.iter().position(|&b| b != b'\r' && b != b'\n').unwrap_or(raw.len());
        let raw = &raw[start..];
        let empty_quoted = [self.quote, self.quote];

        let mut found = Vec::new();
        let mut in_quotes = false;
        let mut field = 0;
        let mut field_start = 0;
        for (idx, &b) in raw.iter().enumerate() {
            if b == self.quote {
                in_quotes = !in_quotes;
                continue;
            }
            if in_quotes || (b != self.delimiter && b != b'\n' && b != b'\r') {
                continue;
            }
            if raw[field_start..idx] == empty_quoted {
                found.push(field);
            }
            if b != self.delimiter {
                return found;
            }
            field += 1;
            field_start = idx + 1;
        }
        if raw[field_start..] == empty_quoted {
            found.push(field);
        }
        found
    }

    /// Dialects tried during inference, preferred options first.
    const fn dialects() -> &'static [Self] {
        &[
            DialectOptions {
                delimiter: b',',
                quote: b'"',
            },
            DialectOptions {
                delimiter: b'|',
                quote: b'"',
            },
            DialectOptions {
                delimiter: b';',
                quote: b'"',
            },
            DialectOptions {
                delimiter: b'\t',
                quote: b'"',
            },
            DialectOptions {
                delimiter: b',',
                quote: b'\'',
            },
            DialectOptions {
                delimiter: b'|',
                quote: b'\'',
            },
            DialectOptions {
                delimiter: b';',
                quote: b'\'',
            },
            DialectOptions {
                delimiter: b'\t',
                quote: b'\'',
            },
        ]
    }
}
