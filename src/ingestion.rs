use crate::error::Result;
use log::debug;
use std::io::Read;
use std::path::Path;

/// A table of untyped string cells, straight from a CSV export or built in memory.
///
/// Headers keep their original spelling; the normalizer maps them to canonical columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub records: Vec<Vec<String>>,
}

impl RawTable {
    pub fn from_records<H, R, C>(headers: H, records: R) -> Self
    where
        H: IntoIterator,
        H::Item: Into<String>,
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            records: records
                .into_iter()
                .map(|record| record.into_iter().map(Into::into).collect())
                .collect(),
        }
    }

    /// Reads a headed CSV stream. Ragged rows are accepted; missing trailing
    /// cells read as empty.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv_reader
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect::<Vec<_>>();

        let mut records = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            records.push(record.iter().map(str::to_string).collect());
        }

        debug!(
            "Read CSV table with {} columns and {} records",
            headers.len(),
            records.len()
        );

        Ok(Self { headers, records })
    }

    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        Self::from_csv_reader(std::io::BufReader::new(file))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Cell at (`row`, `column`), empty when the record is short.
    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.records
            .get(row)
            .and_then(|record| record.get(column))
            .map(String::as_str)
            .unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_csv_reader() {
        let data = "\u{feff}Partner Name,Region,Base Value\nAcme, North ,100\nGlobex,South\n";
        let table = RawTable::from_csv_reader(data.as_bytes()).unwrap();

        assert_eq!(table.headers, vec!["Partner Name", "Region", "Base Value"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(0, 1), "North");
        assert_eq!(table.cell(1, 2), "");
        assert_eq!(table.cell(5, 0), "");
    }

    #[test]
    fn test_from_records() {
        let table = RawTable::from_records(["Partner", "Revenue"], vec![vec!["A", "10"]]);
        assert_eq!(table.headers.len(), 2);
        assert_eq!(table.cell(0, 0), "A");
        assert!(!table.is_empty());
    }
}
