//! Building the sample table: CSV import with header mapping, the randomised
//! starter table, and the editor's row/value limits.

use crate::structs::Sample;
use rand::Rng;
use rand_distr::{Distribution, Exp1};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use thiserror::Error;

pub const DIAMETER_COLUMN: &str = "Diameter (nm)";
pub const VOLUME_COLUMN: &str = "% Volume";
pub const PDI_COLUMN: &str = "PDI";

const DIAMETER_ALIASES: [&str; 3] = ["diameter (nm)", "diameter", "size (nm)"];
const VOLUME_ALIASES: [&str; 5] = ["% volume", "%volume", "% vol", "volume", "volume fraction"];
const PDI_ALIASES: [&str; 2] = ["pdi", "polydispersity index"];

pub const DIAMETER_RANGE: std::ops::RangeInclusive<f64> = 0.1..=10000.0;
pub const VOLUME_RANGE: std::ops::RangeInclusive<f64> = 0.0..=100.0;
pub const PDI_RANGE: std::ops::RangeInclusive<f64> = 0.001..=1.0;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("missing required column '{0}'")]
    MissingColumn(&'static str),

    #[error("row {row}, column '{column}': '{value}' is not a number")]
    InvalidNumber {
        row: usize,
        column: &'static str,
        value: String,
    },

    #[error("the file contains no data rows")]
    Empty,
}

/// Reads a sample table from a CSV (or TSV, by extension) file.
pub fn import_csv(path: &Path) -> Result<Vec<Sample>, InputError> {
    let delimiter = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => b'\t',
        _ => b',',
    };
    let file = File::open(path)?;
    read_samples(BufReader::new(file), delimiter)
}

/// Maps the three named columns to `Sample` fields. Column order and any extra
/// columns are ignored. Ragged rows are accepted; a row too short to reach a
/// required column fails as `InvalidNumber` with an empty value.
pub fn read_samples<R: Read>(reader: R, delimiter: u8) -> Result<Vec<Sample>, InputError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();
    let find = |aliases: &[&str], name: &'static str| {
        headers
            .iter()
            .position(|h| aliases.contains(&h.as_str()))
            .ok_or(InputError::MissingColumn(name))
    };
    let diameter_idx = find(&DIAMETER_ALIASES, DIAMETER_COLUMN)?;
    let volume_idx = find(&VOLUME_ALIASES, VOLUME_COLUMN)?;
    let pdi_idx = find(&PDI_ALIASES, PDI_COLUMN)?;

    let mut samples = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }
        let row = i + 1;
        let number = |idx: usize, column: &'static str| -> Result<f64, InputError> {
            let raw = record.get(idx).unwrap_or("");
            raw.parse::<f64>().map_err(|_| InputError::InvalidNumber {
                row,
                column,
                value: raw.to_string(),
            })
        };
        samples.push(Sample::new(
            number(diameter_idx, DIAMETER_COLUMN)?,
            number(volume_idx, VOLUME_COLUMN)?,
            number(pdi_idx, PDI_COLUMN)?,
        ));
    }

    if samples.is_empty() {
        return Err(InputError::Empty);
    }
    Ok(samples)
}

/// Starter table: diameters evenly spaced over 10-100 nm, volumes drawn from a
/// flat Dirichlet, PDI uniform in [0.05, 0.3).
pub fn default_table<R: Rng>(n: usize, rng: &mut R) -> Vec<Sample> {
    if n == 0 {
        return Vec::new();
    }

    let draws: Vec<f64> = (0..n).map(|_| Exp1.sample(&mut *rng)).collect();
    let total: f64 = draws.iter().sum();

    (0..n)
        .map(|i| {
            let diameter = if n == 1 {
                10.0
            } else {
                10.0 + 90.0 * i as f64 / (n - 1) as f64
            };
            let volume = if total > 0.0 {
                draws[i] / total * 100.0
            } else {
                100.0 / n as f64
            };
            let pdi = rng.random_range(0.05..0.3);
            Sample::new(round_to(diameter, 2), round_to(volume, 2), round_to(pdi, 3))
        })
        .collect()
}

/// Clamps an edited row into the editor's accepted ranges.
pub fn clamp_sample(sample: Sample) -> Sample {
    Sample::new(
        sample
            .diameter
            .clamp(*DIAMETER_RANGE.start(), *DIAMETER_RANGE.end()),
        sample
            .volume_fraction
            .clamp(*VOLUME_RANGE.start(), *VOLUME_RANGE.end()),
        sample.pdi.clamp(*PDI_RANGE.start(), *PDI_RANGE.end()),
    )
}

/// Grows or shrinks `table` to `rows`, keeping existing rows.
pub fn resize_table(table: &mut Vec<Sample>, rows: usize) {
    if rows < table.len() {
        table.truncate(rows);
        return;
    }
    while table.len() < rows {
        let next = table
            .last()
            .map(|s| Sample::new(s.diameter + 10.0, 0.0, s.pdi))
            .unwrap_or(Sample::new(10.0, 0.0, 0.1));
        table.push(clamp_sample(next));
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::io::Write;

    #[test]
    fn test_read_samples_by_header_name() {
        let data = "PDI,Diameter (nm),% Volume,Operator\n0.1,10,20,ana\n0.2,20,80,ana\n";
        let samples = read_samples(data.as_bytes(), b',').unwrap();
        assert_eq!(
            samples,
            vec![Sample::new(10.0, 20.0, 0.1), Sample::new(20.0, 80.0, 0.2)]
        );
    }

    #[test]
    fn test_read_samples_aliases_and_whitespace() {
        let data = " diameter ; VOLUME ; pdi \n 15 ; 100 ; 0.05 \n";
        let samples = read_samples(data.as_bytes(), b';').unwrap();
        assert_eq!(samples, vec![Sample::new(15.0, 100.0, 0.05)]);
    }

    #[test]
    fn test_missing_column_rejected_before_rows() {
        let data = "Diameter (nm),PDI\nnot-a-number,0.1\n";
        let err = read_samples(data.as_bytes(), b',').unwrap_err();
        assert!(matches!(err, InputError::MissingColumn(VOLUME_COLUMN)));
    }

    #[test]
    fn test_invalid_number_names_row_and_column() {
        let data = "Diameter (nm),% Volume,PDI\n10,50,0.1\n20,abc,0.1\n";
        match read_samples(data.as_bytes(), b',').unwrap_err() {
            InputError::InvalidNumber { row, column, value } => {
                assert_eq!(row, 2);
                assert_eq!(column, VOLUME_COLUMN);
                assert_eq!(value, "abc");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_short_row_names_missing_cell() {
        let data = "Diameter (nm),% Volume,PDI\n10,50,0.1\n20,50\n";
        match read_samples(data.as_bytes(), b',').unwrap_err() {
            InputError::InvalidNumber { row, column, value } => {
                assert_eq!(row, 2);
                assert_eq!(column, PDI_COLUMN);
                assert_eq!(value, "");
            }
            other => panic!("unexpected error: {other}"),
        }

        // Extra trailing cells are ignored.
        let long = "Diameter (nm),% Volume,PDI\n10,50,0.1,note\n";
        assert_eq!(
            read_samples(long.as_bytes(), b',').unwrap(),
            vec![Sample::new(10.0, 50.0, 0.1)]
        );
    }

    #[test]
    fn test_empty_file() {
        let data = "Diameter (nm),% Volume,PDI\n";
        assert!(matches!(
            read_samples(data.as_bytes(), b','),
            Err(InputError::Empty)
        ));
    }

    #[test]
    fn test_import_tsv_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.tsv");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "Diameter (nm)\t% Volume\tPDI").unwrap();
        writeln!(file, "50\t100\t0.2").unwrap();
        drop(file);

        let samples = import_csv(&path).unwrap();
        assert_eq!(samples, vec![Sample::new(50.0, 100.0, 0.2)]);
    }

    #[test]
    fn test_default_table_shape() {
        let mut rng = StdRng::seed_from_u64(7);
        let table = default_table(5, &mut rng);
        assert_eq!(table.len(), 5);
        let diameters: Vec<f64> = table.iter().map(|s| s.diameter).collect();
        assert_eq!(diameters, vec![10.0, 32.5, 55.0, 77.5, 100.0]);

        let volume: f64 = table.iter().map(|s| s.volume_fraction).sum();
        assert!((volume - 100.0).abs() < 0.05);
        assert!(table.iter().all(|s| (0.05..=0.3).contains(&s.pdi)));
    }

    #[test]
    fn test_default_table_single_row() {
        let mut rng = StdRng::seed_from_u64(1);
        let table = default_table(1, &mut rng);
        assert_eq!(table[0].diameter, 10.0);
        assert_eq!(table[0].volume_fraction, 100.0);
        assert!(default_table(0, &mut rng).is_empty());
    }

    #[test]
    fn test_clamp_sample() {
        let s = clamp_sample(Sample::new(-3.0, 250.0, 0.0));
        assert_eq!(s, Sample::new(0.1, 100.0, 0.001));
    }

    #[test]
    fn test_resize_table() {
        let mut table = vec![Sample::new(10.0, 50.0, 0.1), Sample::new(20.0, 50.0, 0.1)];
        resize_table(&mut table, 4);
        assert_eq!(table.len(), 4);
        assert_eq!(table[3].diameter, 40.0);
        assert_eq!(table[3].volume_fraction, 0.0);
        resize_table(&mut table, 1);
        assert_eq!(table, vec![Sample::new(10.0, 50.0, 0.1)]);
    }
}
