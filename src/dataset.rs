use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use crate::{ProtoErr, Result, species::Species};

/// Number of numeric features per sample.
pub const NUM_FEATURES: usize = 4;

const SEPARATOR: char = ',';

// Column order of the dataset file.
const SEPAL_LENGTH_IDX: usize = 0;
const SEPAL_WIDTH_IDX: usize = 1;
const PETAL_LENGTH_IDX: usize = 2;
const PETAL_WIDTH_IDX: usize = 3;
const SPECIES_NAME_IDX: usize = 4;

/// A single labeled iris measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabeledSample {
    pub sepal_length: f32,
    pub sepal_width: f32,
    pub petal_length: f32,
    pub petal_width: f32,
    pub species: Species,
}

impl LabeledSample {
    /// Returns the features in the order the network consumes them.
    pub fn features(&self) -> [f32; NUM_FEATURES] {
        [
            self.sepal_length,
            self.sepal_width,
            self.petal_length,
            self.petal_width,
        ]
    }
}

/// Reads the comma separated iris dataset.
///
/// One sample per non-blank line: sepal length, sepal width, petal length, petal width and the
/// species name. Any malformed line aborts the whole read.
#[derive(Debug, Default, Clone, Copy)]
pub struct DatasetLoader;

impl DatasetLoader {
    pub fn new() -> Self {
        Self
    }

    /// Reads every sample in the file at `path`.
    pub fn read_path<P: AsRef<Path>>(&self, path: P) -> Result<Vec<LabeledSample>> {
        let file = File::open(path)?;
        self.read(BufReader::new(file))
    }

    /// Reads every sample from `source`.
    ///
    /// # Arguments
    /// * `source` - A line oriented reader over the dataset.
    ///
    /// # Returns
    /// The samples in file order, or a `DataFormat` error pointing at the first bad line.
    pub fn read<R: BufRead>(&self, source: R) -> Result<Vec<LabeledSample>> {
        let mut samples = Vec::new();

        for (idx, raw) in source.split(b'\n').enumerate() {
            let raw = raw?;
            let line = String::from_utf8(raw)
                .map_err(|e| ProtoErr::data_format(idx + 1, format!("not valid UTF-8: {e}")))?;
            if line.trim().is_empty() {
                continue;
            }

            samples.push(self.parse_line(idx + 1, &line)?);
        }

        Ok(samples)
    }

    fn parse_line(&self, line_no: usize, line: &str) -> Result<LabeledSample> {
        let fields: Vec<&str> = line.split(SEPARATOR).map(str::trim).collect();
        if fields.len() <= SPECIES_NAME_IDX {
            return Err(ProtoErr::data_format(
                line_no,
                format!("expected 5 fields, got {}", fields.len()),
            ));
        }

        let feature = |idx: usize| -> Result<f32> {
            fields[idx].parse::<f32>().map_err(|e| {
                ProtoErr::data_format(line_no, format!("invalid number {:?}: {e}", fields[idx]))
            })
        };

        let name = fields[SPECIES_NAME_IDX];
        let species = Species::from_name(name).ok_or_else(|| {
            ProtoErr::data_format(line_no, format!("unknown species name: {name}"))
        })?;

        Ok(LabeledSample {
            sepal_length: feature(SEPAL_LENGTH_IDX)?,
            sepal_width: feature(SEPAL_WIDTH_IDX)?,
            petal_length: feature(PETAL_LENGTH_IDX)?,
            petal_width: feature(PETAL_WIDTH_IDX)?,
            species,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_samples_and_skips_blank_lines() {
        let data = "5.1,3.5,1.4,0.2,Iris-setosa\n\n7.0,3.2,4.7,1.4,Iris-versicolor\n   \n6.3,3.3,6.0,2.5,Iris-virginica\n";
        let samples = DatasetLoader::new().read(data.as_bytes()).unwrap();

        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].features(), [5.1, 3.5, 1.4, 0.2]);
        assert_eq!(samples[0].species, Species::Setosa);
        assert_eq!(samples[1].species, Species::Versicolor);
        assert_eq!(samples[2].species, Species::Virginica);
    }

    #[test]
    fn unknown_species_fails_instead_of_skipping() {
        let data = "5.1,3.5,1.4,0.2,Iris-setosa\n5.0,3.6,1.4,0.2,Iris-unknown\n";
        let err = DatasetLoader::new().read(data.as_bytes()).unwrap_err();

        assert!(matches!(err, ProtoErr::DataFormat { line: 2, .. }));
    }

    #[test]
    fn unparseable_numbers_fail() {
        let data = "5.1,abc,1.4,0.2,Iris-setosa\n";
        let err = DatasetLoader::new().read(data.as_bytes()).unwrap_err();

        assert!(matches!(err, ProtoErr::DataFormat { line: 1, .. }));
    }

    #[test]
    fn non_utf8_rows_fail() {
        let data = b"5.1,3.5,1.4,0.2,Iris-setosa\n5.0,3.6,1.4,0.2,Iris-set\xffosa\n";
        let err = DatasetLoader::new().read(&data[..]).unwrap_err();

        assert!(matches!(err, ProtoErr::DataFormat { line: 2, .. }));
    }

    #[test]
    fn crlf_line_endings_are_accepted() {
        let data = "5.1,3.5,1.4,0.2,Iris-setosa\r\n7.0,3.2,4.7,1.4,Iris-versicolor\r\n";
        let samples = DatasetLoader::new().read(data.as_bytes()).unwrap();

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].species, Species::Versicolor);
    }

    #[test]
    fn short_rows_fail() {
        let data = "5.1,3.5,1.4,Iris-setosa\n";
        let err = DatasetLoader::new().read(data.as_bytes()).unwrap_err();

        assert!(matches!(err, ProtoErr::DataFormat { line: 1, .. }));
    }

    #[test]
    fn empty_source_yields_no_samples() {
        let samples = DatasetLoader::new().read("".as_bytes()).unwrap();
        assert!(samples.is_empty());
    }
}
