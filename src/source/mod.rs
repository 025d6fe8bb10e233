//! Row sources feeding the export paths
//!
//! A [`RowSource`] yields unit-task records either all at once
//! ([`RowSource::fetch_all`], the memory path) or pushed one by one into a
//! callback ([`RowSource::stream_all`], the disk path). Sources hold no row
//! state between calls.

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "postgres")]
pub use self::postgres::PostgresRowSource;

use crate::error::Result;
use crate::record::ExportRecord;

/// Callback receiving streamed records in delivery order
pub type RowSink<'a> = dyn FnMut(ExportRecord) -> Result<()> + 'a;

/// Access to the unit-task record set
pub trait RowSource {
    /// Up to `row_count_hint` records, fully materialized.
    fn fetch_all(&mut self, row_count_hint: u64) -> Result<Vec<ExportRecord>>;

    /// Push up to `row_count_hint` records into `on_row`, in the store's
    /// natural order, and return how many were delivered.
    ///
    /// An error from `on_row` stops delivery and is returned unchanged.
    fn stream_all(&mut self, row_count_hint: u64, on_row: &mut RowSink<'_>) -> Result<u64>;
}

impl<T: RowSource + ?Sized> RowSource for &mut T {
    fn fetch_all(&mut self, row_count_hint: u64) -> Result<Vec<ExportRecord>> {
        (**self).fetch_all(row_count_hint)
    }

    fn stream_all(&mut self, row_count_hint: u64, on_row: &mut RowSink<'_>) -> Result<u64> {
        (**self).stream_all(row_count_hint, on_row)
    }
}

impl<T: RowSource + ?Sized> RowSource for Box<T> {
    fn fetch_all(&mut self, row_count_hint: u64) -> Result<Vec<ExportRecord>> {
        (**self).fetch_all(row_count_hint)
    }

    fn stream_all(&mut self, row_count_hint: u64, on_row: &mut RowSink<'_>) -> Result<u64> {
        (**self).stream_all(row_count_hint, on_row)
    }
}

/// Records held in memory
#[derive(Debug, Clone, Default)]
pub struct VecRowSource {
    records: Vec<ExportRecord>,
}

impl VecRowSource {
    pub fn new(records: Vec<ExportRecord>) -> Self {
        VecRowSource { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn limited(&self, row_count_hint: u64) -> &[ExportRecord] {
        let take = usize::try_from(row_count_hint)
            .unwrap_or(usize::MAX)
            .min(self.records.len());
        &self.records[..take]
    }
}

impl From<Vec<ExportRecord>> for VecRowSource {
    fn from(records: Vec<ExportRecord>) -> Self {
        VecRowSource::new(records)
    }
}

impl RowSource for VecRowSource {
    fn fetch_all(&mut self, row_count_hint: u64) -> Result<Vec<ExportRecord>> {
        Ok(self.limited(row_count_hint).to_vec())
    }

    fn stream_all(&mut self, row_count_hint: u64, on_row: &mut RowSink<'_>) -> Result<u64> {
        let mut delivered = 0;
        for record in self.limited(row_count_hint) {
            on_row(record.clone())?;
            delivered += 1;
        }
        Ok(delivered)
    }
}

/// Deterministic unit-task rows for demos and benchmarks
///
/// Row `n` (from 1) has id `"{n}"`, `level_k = "Level{k}-{n % 10}"` and
/// department `"Dept-{n % 7}"`. Every 13th row leaves `level_6` empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyntheticRowSource {
    total: Option<u64>,
}

impl SyntheticRowSource {
    /// Generates as many rows as each request asks for.
    pub fn new() -> Self {
        SyntheticRowSource { total: None }
    }

    /// Never yields more than `total` rows, whatever the hint.
    pub fn with_total(total: u64) -> Self {
        SyntheticRowSource { total: Some(total) }
    }

    fn available(&self, row_count_hint: u64) -> u64 {
        self.total.map_or(row_count_hint, |total| total.min(row_count_hint))
    }

    pub fn record(n: u64) -> ExportRecord {
        let level = |k: u8| Some(format!("Level{}-{}", k, n % 10));
        ExportRecord {
            id: Some(n.to_string()),
            level1: level(1),
            level2: level(2),
            level3: level(3),
            level4: level(4),
            level5: level(5),
            level6: if n % 13 == 0 { None } else { level(6) },
            department: Some(format!("Dept-{}", n % 7)),
        }
    }
}

impl RowSource for SyntheticRowSource {
    fn fetch_all(&mut self, row_count_hint: u64) -> Result<Vec<ExportRecord>> {
        Ok((1..=self.available(row_count_hint)).map(Self::record).collect())
    }

    fn stream_all(&mut self, row_count_hint: u64, on_row: &mut RowSink<'_>) -> Result<u64> {
        let count = self.available(row_count_hint);
        for n in 1..=count {
            on_row(Self::record(n))?;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExportError;

    fn ids(records: &[ExportRecord]) -> Vec<&str> {
        records.iter().filter_map(|r| r.id.as_deref()).collect()
    }

    #[test]
    fn test_vec_source_honors_hint() {
        let records: Vec<ExportRecord> = (1..=5).map(SyntheticRowSource::record).collect();
        let mut source = VecRowSource::new(records);

        assert_eq!(ids(&source.fetch_all(3).unwrap()), vec!["1", "2", "3"]);
        assert_eq!(source.fetch_all(100).unwrap().len(), 5);
        assert!(source.fetch_all(0).unwrap().is_empty());

        let mut seen = Vec::new();
        let delivered = source
            .stream_all(4, &mut |r: ExportRecord| {
                seen.push(r);
                Ok(())
            })
            .unwrap();
        assert_eq!(delivered, 4);
        assert_eq!(ids(&seen), vec!["1", "2", "3", "4"]);
    }

    #[test]
    fn test_callback_error_stops_delivery() {
        let mut source = SyntheticRowSource::new();
        let mut calls = 0;
        let err = source
            .stream_all(10, &mut |_: ExportRecord| {
                calls += 1;
                if calls == 3 {
                    return Err(ExportError::SerializationFailure("full".to_string()));
                }
                Ok(())
            })
            .unwrap_err();
        assert_eq!(calls, 3);
        assert!(matches!(err, ExportError::SerializationFailure(_)));
    }

    #[test]
    fn test_synthetic_rows() {
        let row = SyntheticRowSource::record(13);
        assert_eq!(row.id.as_deref(), Some("13"));
        assert_eq!(row.level1.as_deref(), Some("Level1-3"));
        assert_eq!(row.level6, None);
        assert_eq!(row.department.as_deref(), Some("Dept-6"));

        let mut source = SyntheticRowSource::with_total(2);
        assert_eq!(source.fetch_all(10).unwrap().len(), 2);
        assert_eq!(source.stream_all(10, &mut |_: ExportRecord| Ok(())).unwrap(), 2);
    }

    fn fetched<S: RowSource>(mut source: S, hint: u64) -> usize {
        source.fetch_all(hint).unwrap().len()
    }

    #[test]
    fn test_boxed_and_borrowed_sources() {
        let mut inner = SyntheticRowSource::new();
        assert_eq!(fetched(&mut inner, 2), 2);

        let mut boxed: Box<dyn RowSource> = Box::new(SyntheticRowSource::new());
        assert_eq!(boxed.stream_all(3, &mut |_: ExportRecord| Ok(())).unwrap(), 3);
    }
}
