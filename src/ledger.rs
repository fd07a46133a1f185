use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use fs2::FileExt;
use log::{debug, info, warn};
use rev_lines::RevLines;
use tempfile::NamedTempFile;

use crate::error::{LedgerError, ValidationError};
use crate::record::{parse_date, Field, Record, HEADER};

/// The ledger file and every operation that touches it.
///
/// Ids are positional: they always run `1..=N` in file order, and deleting a
/// record shifts every later id down by one.
pub struct LedgerStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut lock_name = path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "ledger".into());
        lock_name.push(".lock");
        let lock_path = path.with_file_name(lock_name);

        Self { path, lock_path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the store with only the header row if it does not exist yet.
    pub fn ensure_initialized(&self) -> Result<(), LedgerError> {
        if self.path.exists() {
            return Ok(());
        }
        let _lock = self.lock()?;
        // another writer may have won the race while we waited for the lock
        if self.path.exists() {
            return Ok(());
        }
        self.rewrite(&[])?;
        info!("created ledger at {}", self.path.display());
        Ok(())
    }

    /// The id the next appended record should get.
    ///
    /// Normally only the last line of the file is read, walking backward from
    /// the end. A last line holding a quote may close a multi-line field, so
    /// then the whole store is parsed instead.
    pub fn next_id(&self) -> Result<u32, LedgerError> {
        let file = File::open(&self.path)?;
        let mut rev_lines = RevLines::new(BufReader::new(file))?;

        let last_line = match rev_lines.find(|line| !line.trim().is_empty()) {
            Some(line) => line,
            None => return Ok(1),
        };

        let last_id = if last_line.contains('"') {
            match self.load()?.last() {
                Some(record) => record.id,
                None => 0,
            }
        } else {
            let first_column = last_line.split(',').next().unwrap_or_default().trim();
            if first_column == HEADER[0] {
                return Ok(1);
            }
            first_column.parse::<u32>().map_err(|_| {
                LedgerError::parse(None, format!("last row has a non-numeric id {first_column:?}"))
            })?
        };

        last_id
            .checked_add(1)
            .ok_or_else(|| LedgerError::parse(Some(last_id), "no ids left after this record"))
    }

    /// The last `count` records in file order, read from the end of the file.
    ///
    /// Falls back to a full parse when any line in the window holds a quote,
    /// since raw lines then need not line up with records.
    pub fn tail(&self, count: usize) -> Result<Vec<Record>, LedgerError> {
        let file = File::open(&self.path)?;
        let rev_lines = RevLines::new(BufReader::new(file))?;

        let mut lines: Vec<String> = rev_lines
            .filter(|line| !line.trim().is_empty())
            .take(count + 1)
            .collect();

        if lines.iter().any(|line| line.contains('"')) {
            let mut records = self.load()?;
            let skip = records.len().saturating_sub(count);
            return Ok(records.split_off(skip));
        }

        lines.reverse();
        // the header only shows up when the whole file fit in the window
        if lines.len() > count || lines.first().map(|l| is_header(l)).unwrap_or(false) {
            lines.remove(0);
        }

        let text = lines.join("\n");
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(text.as_bytes());

        let mut records = Vec::with_capacity(lines.len());
        for result in reader.deserialize() {
            records.push(result?);
        }
        Ok(records)
    }

    /// Read every record in file order.
    pub fn load(&self) -> Result<Vec<Record>, LedgerError> {
        let file = File::open(&self.path)?;
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::Headers)
            .from_reader(BufReader::new(file));

        let mut records = Vec::new();
        for result in reader.deserialize() {
            let record: Record = result?;
            records.push(record);
        }
        Ok(records)
    }

    /// Write one record at the end of the store.
    ///
    /// The caller owns the record's consistency (sign of the amount against
    /// its kind, and its id, normally [`LedgerStore::next_id`]).
    pub fn append(&self, record: &Record) -> Result<(), LedgerError> {
        let _lock = self.lock()?;
        let file = OpenOptions::new().append(true).open(&self.path)?;
        let mut writer = csv_writer(file);
        writer.serialize(record)?;
        writer.flush()?;
        debug!("appended record {} to {}", record.id, self.path.display());
        Ok(())
    }

    /// Replace one cell of one record and rewrite the store.
    ///
    /// Nothing is written unless `field` names an editable column, `id` is in
    /// `1..=N` and, for dates, `value` is a valid ISO date.
    pub fn update(&self, id: u32, field: &str, value: &str) -> Result<Record, LedgerError> {
        let _lock = self.lock()?;
        let mut records = self.load()?;

        let field = field.parse::<Field>()?;
        if id < 1 || id as usize > records.len() {
            return Err(ValidationError::IdOutOfRange {
                id,
                count: records.len(),
            }
            .into());
        }
        if field == Field::Date {
            parse_date(value)?;
        }

        let record = &mut records[id as usize - 1];
        record.set(field, value);
        let updated = record.clone();
        debug!("record {id}: column {} set to {value:?}", field.column());

        self.rewrite(&records)?;
        Ok(updated)
    }

    /// Remove the record with `id` and renumber the rest so ids stay dense.
    pub fn delete(&self, id: u32) -> Result<Record, LedgerError> {
        let _lock = self.lock()?;
        let mut records = self.load()?;
        if records.is_empty() {
            return Err(LedgerError::EmptyStore);
        }

        let position = records
            .iter()
            .position(|record| record.id == id)
            .ok_or(LedgerError::NotFound(id))?;
        let removed = records.remove(position);

        for (index, record) in records.iter_mut().enumerate() {
            record.id = index as u32 + 1;
        }

        self.rewrite(&records)?;
        debug!("deleted record {id}, {} records remain", records.len());
        Ok(removed)
    }

    /// Records dated within `from..=to`, in file order.
    ///
    /// A reversed or degenerate window (`from >= to`) is not an error: it
    /// disables filtering and every record is returned.
    pub fn filter(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Record>, LedgerError> {
        let records = self.load()?;
        if from >= to {
            return Ok(records);
        }

        let mut kept = Vec::new();
        for record in records {
            let date = record.parsed_date()?;
            if date >= from && date <= to {
                kept.push(record);
            }
        }
        Ok(kept)
    }

    /// Replace the whole store with `records` via a temp file and a rename,
    /// so readers see either the old file or the new one.
    fn rewrite(&self, records: &[Record]) -> Result<(), LedgerError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let tmp = NamedTempFile::new_in(dir)?;

        let mut writer = csv_writer(tmp);
        writer.write_record(HEADER)?;
        for record in records {
            writer.serialize(record)?;
        }
        let tmp = writer.into_inner().map_err(|e| e.into_error())?;
        // temp files start out private; keep the mode the store already had
        match fs::metadata(&self.path) {
            Ok(meta) => tmp.as_file().set_permissions(meta.permissions())?,
            Err(_) => set_new_store_permissions(tmp.as_file())?,
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)?;

        debug!("rewrote {} with {} records", self.path.display(), records.len());
        Ok(())
    }

    /// Exclusive advisory lock held for the lifetime of the returned handle.
    fn lock(&self) -> Result<File, LedgerError> {
        let lock_file = File::create(&self.lock_path)?;
        lock_file.try_lock_exclusive().map_err(|err| {
            warn!("could not lock {}: {err}", self.lock_path.display());
            LedgerError::Locked(self.lock_path.clone())
        })?;
        Ok(lock_file)
    }
}

fn csv_writer<W: Write>(inner: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(inner)
}

#[cfg(unix)]
fn set_new_store_permissions(file: &File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn set_new_store_permissions(_file: &File) -> std::io::Result<()> {
    Ok(())
}

fn is_header(line: &str) -> bool {
    line.split(',').next().map(str::trim) == Some(HEADER[0])
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use tempfile::TempDir;

    use super::LedgerStore;
    use crate::amount::Amount;
    use crate::error::{LedgerError, ValidationError};
    use crate::record::{Kind, Record};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn store() -> (TempDir, LedgerStore) {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let store = LedgerStore::new(dir.path().join("finance.csv"));
        store.ensure_initialized().unwrap();
        (dir, store)
    }

    fn add(store: &LedgerStore, on: NaiveDate, desc: &str, units: i64) -> Result<u32, LedgerError> {
        let id = store.next_id()?;
        let kind = if units < 0 { Kind::Expense } else { Kind::Income };
        store.append(&Record::new(id, on, desc, Amount::from_units(units), kind))?;
        Ok(id)
    }

    fn ids(store: &LedgerStore) -> Vec<u32> {
        store.load().unwrap().iter().map(|r| r.id).collect()
    }

    #[test]
    fn test_initialize_writes_header_once() -> Result<(), LedgerError> {
        let (_dir, store) = store();
        assert_eq!(std::fs::read_to_string(store.path())?, "ID,Date,Description,Amount,Type\n");

        add(&store, date(2024, 1, 1), "Coffee", -3)?;
        store.ensure_initialized()?;
        assert_eq!(store.load()?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_next_id_on_header_only_store() -> Result<(), LedgerError> {
        let (_dir, store) = store();
        assert_eq!(store.next_id()?, 1);
        Ok(())
    }

    #[test]
    fn test_appends_assign_dense_ids() -> Result<(), LedgerError> {
        let (_dir, store) = store();
        for n in 0..12 {
            let id = add(&store, date(2024, 3, 1), "Entry", n - 6)?;
            assert_eq!(id, n as u32 + 1);
        }
        assert_eq!(ids(&store), (1..=12).collect::<Vec<u32>>());
        // multi digit ids are read back whole
        assert_eq!(store.next_id()?, 13);
        Ok(())
    }

    #[test]
    fn test_descriptions_with_commas_survive() -> Result<(), LedgerError> {
        let (_dir, store) = store();
        add(&store, date(2024, 1, 2), "Rent, January \"flat\"", -900)?;
        let records = store.load()?;
        assert_eq!(records[0].description, "Rent, January \"flat\"");
        assert_eq!(store.next_id()?, 2);
        Ok(())
    }

    #[test]
    fn test_tail_returns_last_records_in_order() -> Result<(), LedgerError> {
        let (_dir, store) = store();
        assert!(store.tail(5)?.is_empty());

        for n in 1..=3 {
            add(&store, date(2024, 1, n), "Entry", n as i64)?;
        }
        let tail: Vec<u32> = store.tail(5)?.iter().map(|r| r.id).collect();
        assert_eq!(tail, vec![1, 2, 3]);

        for n in 4..=8 {
            add(&store, date(2024, 1, n), "Entry", n as i64)?;
        }
        let tail: Vec<u32> = store.tail(5)?.iter().map(|r| r.id).collect();
        assert_eq!(tail, vec![4, 5, 6, 7, 8]);
        Ok(())
    }

    #[test]
    fn test_update_replaces_one_cell() -> Result<(), LedgerError> {
        let (_dir, store) = store();
        add(&store, date(2024, 1, 20), "Shopping", -20)?;
        add(&store, date(2024, 12, 25), "Investment", 100)?;

        let updated = store.update(1, "Description", "Changed")?;
        assert_eq!(updated.description, "Changed");

        let records = store.load()?;
        assert_eq!(records[0].description, "Changed");
        assert_eq!(records[0].amount, "-20");
        assert_eq!(records[1].description, "Investment");
        Ok(())
    }

    #[test]
    fn test_rejected_update_leaves_store_untouched() -> Result<(), LedgerError> {
        let (_dir, store) = store();
        add(&store, date(2024, 1, 20), "Shopping", -20)?;
        let before = std::fs::read(store.path())?;

        let err = store.update(1, "Colour", "red").unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation(ValidationError::UnknownField(_))
        ));

        let err = store.update(2, "Amount", "5").unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation(ValidationError::IdOutOfRange { id: 2, count: 1 })
        ));

        let err = store.update(0, "Amount", "5").unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation(ValidationError::IdOutOfRange { id: 0, .. })
        ));

        let err = store.update(1, "Date", "tomorrow").unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation(ValidationError::MalformedDate(_))
        ));

        assert_eq!(std::fs::read(store.path())?, before);
        Ok(())
    }

    #[test]
    fn test_delete_renumbers_following_records() -> Result<(), LedgerError> {
        let (_dir, store) = store();
        for (n, desc) in ["a", "b", "c", "d", "e"].iter().enumerate() {
            add(&store, date(2024, 2, n as u32 + 1), desc, 1)?;
        }

        let removed = store.delete(2)?;
        assert_eq!(removed.description, "b");

        let records = store.load()?;
        let ids: Vec<u32> = records.iter().map(|r| r.id).collect();
        let descs: Vec<&str> = records.iter().map(|r| r.description.as_str()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(descs, vec!["a", "c", "d", "e"]);
        assert_eq!(store.next_id()?, 5);
        Ok(())
    }

    #[test]
    fn test_delete_missing_and_empty() -> Result<(), LedgerError> {
        let (_dir, store) = store();
        assert!(matches!(store.delete(1), Err(LedgerError::EmptyStore)));

        add(&store, date(2024, 2, 1), "only", 1)?;
        let before = std::fs::read(store.path())?;
        assert!(matches!(store.delete(4), Err(LedgerError::NotFound(4))));
        assert_eq!(std::fs::read(store.path())?, before);

        store.delete(1)?;
        assert!(store.load()?.is_empty());
        assert_eq!(store.next_id()?, 1);
        Ok(())
    }

    #[test]
    fn test_filter_window_is_inclusive() -> Result<(), LedgerError> {
        let (_dir, store) = store();
        add(&store, date(2024, 1, 1), "before", 1)?;
        add(&store, date(2024, 1, 10), "start", 2)?;
        add(&store, date(2024, 1, 31), "end", 3)?;
        add(&store, date(2024, 1, 15), "middle", 4)?;
        add(&store, date(2024, 2, 1), "after", 5)?;

        let kept: Vec<String> = store
            .filter(date(2024, 1, 10), date(2024, 1, 31))?
            .into_iter()
            .map(|r| r.description)
            .collect();
        assert_eq!(kept, vec!["start", "end", "middle"]);
        Ok(())
    }

    #[test]
    fn test_degenerate_window_returns_everything() -> Result<(), LedgerError> {
        let (_dir, store) = store();
        add(&store, date(2023, 6, 1), "old", 1)?;
        add(&store, date(2024, 6, 1), "new", 2)?;

        let same_day = date(2030, 1, 1);
        assert_eq!(store.filter(same_day, same_day)?.len(), 2);
        assert_eq!(store.filter(date(2030, 1, 1), date(2020, 1, 1))?.len(), 2);
        Ok(())
    }

    #[test]
    fn test_filter_reports_malformed_date() -> Result<(), LedgerError> {
        let (_dir, store) = store();
        add(&store, date(2024, 1, 1), "fine", 1)?;
        add(&store, date(2024, 1, 2), "broken", 1)?;
        std::fs::write(
            store.path(),
            std::fs::read_to_string(store.path())?.replace("2024-01-02", "01/02/2024"),
        )?;

        let err = store.filter(date(2024, 1, 1), date(2024, 12, 31)).unwrap_err();
        assert!(matches!(err, LedgerError::Parse { id: Some(2), .. }));
        Ok(())
    }

    #[test]
    fn test_second_writer_is_locked_out() -> Result<(), LedgerError> {
        let (_dir, store) = store();
        let _held = store.lock()?;
        let other = LedgerStore::new(store.path());
        let err = other.delete(1).unwrap_err();
        assert!(matches!(err, LedgerError::Locked(_)));
        Ok(())
    }

    #[test]
    fn test_multi_line_description_keeps_appends_working() -> Result<(), LedgerError> {
        let (_dir, store) = store();
        add(&store, date(2024, 1, 1), "first", 1)?;
        add(&store, date(2024, 1, 2), "line one\nline two", -5)?;
        assert_eq!(store.next_id()?, 3);

        let tail = store.tail(5)?;
        let descs: Vec<&str> = tail.iter().map(|r| r.description.as_str()).collect();
        assert_eq!(descs, vec!["first", "line one\nline two"]);

        // a continuation line that looks like a row must not be taken for one
        add(&store, date(2024, 1, 3), "a\n12,2024-01-01,x,1,Income", 2)?;
        assert_eq!(store.next_id()?, 4);
        let tail: Vec<u32> = store.tail(2)?.iter().map(|r| r.id).collect();
        assert_eq!(tail, vec![2, 3]);

        add(&store, date(2024, 1, 4), "plain", 3)?;
        assert_eq!(store.next_id()?, 5);
        assert_eq!(ids(&store), vec![1, 2, 3, 4]);
        Ok(())
    }

    #[test]
    fn test_whitespace_in_cells_is_preserved() -> Result<(), LedgerError> {
        let (_dir, store) = store();
        add(&store, date(2024, 1, 1), "  padded  ", -5)?;
        add(&store, date(2024, 1, 2), "other", 7)?;
        assert_eq!(store.load()?[0].description, "  padded  ");

        // editing another record must not touch this one
        store.update(2, "Amount", "5")?;
        let records = store.load()?;
        assert_eq!(records[0].description, "  padded  ");
        assert_eq!(records[1].amount, "5");
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_rewrite_keeps_file_mode() -> Result<(), LedgerError> {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, store) = store();
        let mode = |store: &LedgerStore| {
            std::fs::metadata(store.path()).map(|meta| meta.permissions().mode() & 0o777)
        };
        assert_eq!(mode(&store)?, 0o644);

        add(&store, date(2024, 1, 1), "Coffee", -3)?;
        std::fs::set_permissions(store.path(), std::fs::Permissions::from_mode(0o640))?;
        store.update(1, "Description", "Tea")?;
        assert_eq!(mode(&store)?, 0o640);
        Ok(())
    }

    #[test]
    fn test_next_id_reports_exhausted_ids() -> Result<(), LedgerError> {
        let (_dir, store) = store();
        std::fs::write(
            store.path(),
            "ID,Date,Description,Amount,Type\n4294967295,2024-01-01,max,1,Income\n",
        )?;
        let err = store.next_id().unwrap_err();
        assert!(matches!(err, LedgerError::Parse { id: Some(u32::MAX), .. }));
        Ok(())
    }
}
