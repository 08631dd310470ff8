//! CSV loading for record sources and ground-truth files.

use crate::config::DatasetConfig;
use crate::error::LinkageError;
use crate::model::{GroundTruth, PairId, Record, RecordStore};

fn reader(csv_data: &str, has_header: bool) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .has_headers(has_header)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(csv_data.as_bytes())
}

/// Load one dataset.
///
/// Each row becomes a record keyed by the id column. Values keep the row's
/// column positions; when `attributes` is set, other columns are blanked.
pub fn load_records_csv(csv_data: &str, config: &DatasetConfig) -> Result<RecordStore, LinkageError> {
    let mut reader = reader(csv_data, config.has_header);
    let mut store = RecordStore::new();

    for (row, result) in reader.records().enumerate() {
        let line = row + 1 + usize::from(config.has_header);
        let record = result.map_err(|e| LinkageError::Io(format!("{}: {e}", config.file)))?;

        let id = record.get(config.id_column).ok_or_else(|| {
            LinkageError::Data(format!(
                "{} line {line}: missing id column {}",
                config.file, config.id_column
            ))
        })?;
        if id.is_empty() {
            return Err(LinkageError::Data(format!("{} line {line}: empty record id", config.file)));
        }

        let values: Vec<String> = match &config.attributes {
            None => record.iter().map(|v| v.to_lowercase()).collect(),
            Some(attributes) => (0..record.len())
                .map(|i| {
                    if attributes.contains(&i) {
                        record.get(i).unwrap_or_default().to_lowercase()
                    } else {
                        String::new()
                    }
                })
                .collect(),
        };
        if let Some(attributes) = &config.attributes {
            if let Some(&missing) = attributes.iter().find(|&&a| a >= record.len()) {
                return Err(LinkageError::AttributeIndex {
                    record_id: id.to_string(),
                    index: missing,
                    len: record.len(),
                });
            }
        }

        store.insert(Record::new(id, values))?;
    }

    log::info!("loaded {} record(s) from {}", store.len(), config.file);
    Ok(store)
}

/// Load ground-truth pairs: first column is the A id, second the B id.
pub fn load_ground_truth_csv(csv_data: &str, has_header: bool) -> Result<GroundTruth, LinkageError> {
    let mut reader = reader(csv_data, has_header);
    let mut pairs: Vec<PairId> = Vec::new();

    for (row, result) in reader.records().enumerate() {
        let line = row + 1 + usize::from(has_header);
        let record = result.map_err(|e| LinkageError::Io(e.to_string()))?;
        match (record.get(0), record.get(1)) {
            (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => {
                pairs.push((a.to_string(), b.to_string()));
            }
            _ => {
                return Err(LinkageError::Data(format!(
                    "ground truth line {line}: expected two record ids"
                )))
            }
        }
    }

    let truth = GroundTruth::new(pairs);
    log::info!("loaded {} true match(es)", truth.len());
    Ok(truth)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(attributes: Option<Vec<usize>>, has_header: bool) -> DatasetConfig {
        DatasetConfig { file: "a.csv".into(), id_column: 0, attributes, has_header }
    }

    #[test]
    fn load_all_columns() {
        let csv = "rec_id,given,surname\nrec-1, John ,SMITH\nrec-2,mary,jones\n";
        let store = load_records_csv(csv, &dataset(None, true)).unwrap();
        assert_eq!(store.len(), 2);
        let r = store.get("rec-1").unwrap();
        assert_eq!(r.values, vec!["rec-1", "john", "smith"]);
    }

    #[test]
    fn load_selected_columns_keeps_positions() {
        let csv = "rec-1,john,smith,perth\n";
        let store = load_records_csv(csv, &dataset(Some(vec![2, 3]), false)).unwrap();
        assert_eq!(store.get("rec-1").unwrap().values, vec!["", "", "smith", "perth"]);
    }

    #[test]
    fn attribute_beyond_row_fails() {
        let csv = "rec-1,john\n";
        let err = load_records_csv(csv, &dataset(Some(vec![5]), false)).unwrap_err();
        assert!(matches!(err, LinkageError::AttributeIndex { index: 5, .. }));
    }

    #[test]
    fn duplicate_and_empty_ids_fail() {
        let dup = "id,name\n1,a\n1,b\n";
        assert!(load_records_csv(dup, &dataset(None, true)).unwrap_err().is_data());
        let empty = "id,name\n,a\n";
        let err = load_records_csv(empty, &dataset(None, true)).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn ground_truth() {
        let csv = "id_a,id_b\nrec-1,rec-9\nrec-2,rec-8\n";
        let truth = load_ground_truth_csv(csv, true).unwrap();
        assert_eq!(truth.len(), 2);
        assert!(truth.contains(&("rec-1".to_string(), "rec-9".to_string())));

        let bad = "rec-1\n";
        assert!(load_ground_truth_csv(bad, false).unwrap_err().is_data());
    }
}
