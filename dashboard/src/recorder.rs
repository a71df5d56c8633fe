use crate::config::PersistMode;
use crate::errors::{Error, Result};
use crate::metrics::{PERSIST_FAILURES_TOTAL, READINGS_RECORDED_TOTAL, TABLE_ROWS};
use crate::model::Reading;
use csv::{ReaderBuilder, Writer, WriterBuilder};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, error, info};

pub const CSV_HEADER: [&str; 6] = [
    "Timestamp",
    "Temperature",
    "Pressure",
    "Gas",
    "Humidity",
    "DewPoint",
];

/// The ordered table of readings plus the CSV file backing it.
///
/// The in-memory table only grows after the file write succeeded, so a
/// reload of the file always reproduces what is held in memory.
#[derive(Debug)]
pub struct Recorder {
    path: PathBuf,
    mode: PersistMode,
    readings: Vec<Reading>,
}

impl Recorder {
    /// Loads the table from `path`. A missing file is an empty table.
    pub fn open(path: impl Into<PathBuf>, mode: PersistMode) -> Result<Self> {
        let path = path.into();
        let readings = load(&path)?;
        info!(
            "Loaded {} readings from {} ({:?} mode)",
            readings.len(),
            path.display(),
            mode
        );
        TABLE_ROWS.set(readings.len() as f64);

        Ok(Self {
            path,
            mode,
            readings,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    pub fn latest(&self) -> Option<&Reading> {
        self.readings.last()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Persists `reading` and appends it to the table
    pub fn record(&mut self, reading: Reading) -> Result<()> {
        let written = self.prepare(&reading).write();
        self.finish(reading, written)
    }

    /// Snapshot of the file write needed for `reading`. The write itself
    /// can then run without holding the table.
    pub fn prepare(&self, reading: &Reading) -> PendingWrite {
        match self.mode {
            PersistMode::Append => PendingWrite::Append {
                path: self.path.clone(),
                row: reading.clone(),
            },
            PersistMode::Rewrite => PendingWrite::Rewrite {
                path: self.path.clone(),
                rows: self.readings.iter().chain(Some(reading)).cloned().collect(),
            },
        }
    }

    /// Appends `reading` to the table if its write succeeded
    pub fn finish(&mut self, reading: Reading, written: Result<()>) -> Result<()> {
        if let Err(e) = written {
            PERSIST_FAILURES_TOTAL.inc();
            error!("Failed to write {}: {}", self.path().display(), e);
            return Err(e);
        }

        debug!("Recorded reading at {}", reading.timestamp);
        self.readings.push(reading);
        READINGS_RECORDED_TOTAL.inc();
        TABLE_ROWS.set(self.readings.len() as f64);
        Ok(())
    }

    /// Full table as CSV, header included
    pub fn to_csv(&self) -> Result<Vec<u8>> {
        let mut writer = headerless_writer(Vec::new());
        write_table(&mut writer, self.readings.iter())?;
        writer.into_inner().map_err(|e| Error::Io(e.into_error()))
    }
}

fn load(path: &Path) -> Result<Vec<Reading>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("{} not found, starting with an empty table", path.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);
    let mut readings = Vec::new();
    for row in reader.deserialize::<Reading>() {
        readings.push(row?);
    }
    Ok(readings)
}

fn headerless_writer<W: Write>(inner: W) -> Writer<W> {
    WriterBuilder::new().has_headers(false).from_writer(inner)
}

fn write_table<'a, W, I>(writer: &mut Writer<W>, rows: I) -> Result<()>
where
    W: Write,
    I: Iterator<Item = &'a Reading>,
{
    writer.write_record(CSV_HEADER)?;
    for reading in rows {
        writer.serialize(reading)?;
    }
    writer.flush()?;
    Ok(())
}

/// File write produced by [`Recorder::prepare`]
#[derive(Debug)]
pub enum PendingWrite {
    Append { path: PathBuf, row: Reading },
    Rewrite { path: PathBuf, rows: Vec<Reading> },
}

impl PendingWrite {
    pub fn write(self) -> Result<()> {
        match self {
            PendingWrite::Append { path, row } => append_row(&path, &row),
            PendingWrite::Rewrite { path, rows } => rewrite_file(&path, rows.iter()),
        }
    }
}

fn append_row(path: &Path, reading: &Reading) -> Result<()> {
    let mut file = OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(path)?;
    let len = file.metadata()?.len();

    // a file written by hand may lack the final newline
    let needs_newline = if len > 0 {
        let mut last = [0u8; 1];
        file.seek(SeekFrom::Start(len - 1))?;
        file.read_exact(&mut last)?;
        last[0] != b'\n'
    } else {
        false
    };
    if needs_newline {
        file.write_all(b"\n")?;
    }

    let mut writer = headerless_writer(file);
    if len == 0 {
        writer.write_record(CSV_HEADER)?;
    }
    writer.serialize(reading)?;
    writer.flush()?;
    Ok(())
}

/// Writes the table to a sibling temp file and renames it into place,
/// so a failed write never truncates the existing file.
fn rewrite_file<'a, I>(path: &Path, rows: I) -> Result<()>
where
    I: Iterator<Item = &'a Reading>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = headerless_writer(tmp.as_file_mut());
        write_table(&mut writer, rows)?;
    }
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn reading(timestamp: &str, temperature: f64, dew_point: Option<f64>) -> Reading {
        Reading {
            timestamp: timestamp.to_string(),
            temperature,
            pressure: 1011.2,
            gas: 150.0,
            humidity: 55.3,
            dew_point,
        }
    }

    #[test]
    fn test_missing_file_is_empty_table() {
        let dir = tempdir().unwrap();
        let recorder = Recorder::open(dir.path().join("absent.csv"), PersistMode::Append).unwrap();
        assert!(recorder.is_empty());
        assert!(recorder.latest().is_none());
    }

    #[test]
    fn test_header_only_file_is_empty_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("live.csv");
        std::fs::write(&path, "Timestamp,Temperature,Pressure,Gas,Humidity,DewPoint\n").unwrap();

        let recorder = Recorder::open(&path, PersistMode::Append).unwrap();
        assert_eq!(recorder.len(), 0);
    }

    #[test]
    fn test_append_to_header_without_trailing_newline() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("live.csv");
        std::fs::write(&path, "Timestamp,Temperature,Pressure,Gas,Humidity,DewPoint").unwrap();

        let mut recorder = Recorder::open(&path, PersistMode::Append).unwrap();
        recorder.record(reading("10:00:00", 24.5, None)).unwrap();

        let reloaded = Recorder::open(&path, PersistMode::Append).unwrap();
        assert_eq!(reloaded.readings(), recorder.readings());
        assert_eq!(reloaded.len(), 1);
    }

    #[test]
    fn test_append_after_row_without_trailing_newline() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("live.csv");
        std::fs::write(
            &path,
            "Timestamp,Temperature,Pressure,Gas,Humidity,DewPoint\n09:59:50,24.0,1011.0,140.0,55.0,",
        )
        .unwrap();

        let mut recorder = Recorder::open(&path, PersistMode::Append).unwrap();
        assert_eq!(recorder.len(), 1);
        recorder.record(reading("10:00:00", 24.5, None)).unwrap();

        let reloaded = Recorder::open(&path, PersistMode::Append).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.readings(), recorder.readings());
    }

    #[test]
    fn test_first_append_writes_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("live.csv");
        let mut recorder = Recorder::open(&path, PersistMode::Append).unwrap();

        recorder.record(reading("10:00:00", 24.5, Some(14.9))).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(
            lines.next(),
            Some("Timestamp,Temperature,Pressure,Gas,Humidity,DewPoint")
        );
        assert_eq!(lines.next(), Some("10:00:00,24.5,1011.2,150.0,55.3,14.9"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_append_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("live.csv");
        let mut recorder = Recorder::open(&path, PersistMode::Append).unwrap();

        recorder.record(reading("10:00:00", 24.5, Some(14.948_612_3))).unwrap();
        recorder.record(reading("10:00:10", 24.625, None)).unwrap();
        recorder.record(reading("10:00:20", -3.1, Some(-9.0))).unwrap();

        let reloaded = Recorder::open(&path, PersistMode::Append).unwrap();
        assert_eq!(reloaded.readings(), recorder.readings());
    }

    #[test]
    fn test_rewrite_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("live.csv");
        let mut recorder = Recorder::open(&path, PersistMode::Rewrite).unwrap();

        recorder.record(reading("10:00:00", 24.5, None)).unwrap();
        recorder.record(reading("10:00:10", 25.0, Some(15.2))).unwrap();

        let reloaded = Recorder::open(&path, PersistMode::Rewrite).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.readings(), recorder.readings());

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.matches("Timestamp").count(), 1);
    }

    #[test]
    fn test_append_after_reload_keeps_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("live.csv");
        {
            let mut recorder = Recorder::open(&path, PersistMode::Append).unwrap();
            recorder.record(reading("09:00:00", 20.0, None)).unwrap();
        }

        let mut recorder = Recorder::open(&path, PersistMode::Append).unwrap();
        recorder.record(reading("09:00:10", 21.0, None)).unwrap();

        let reloaded = Recorder::open(&path, PersistMode::Append).unwrap();
        let stamps: Vec<&str> = reloaded
            .readings()
            .iter()
            .map(|r| r.timestamp.as_str())
            .collect();
        assert_eq!(stamps, vec!["09:00:00", "09:00:10"]);
    }

    #[test]
    fn test_failed_write_leaves_table_unchanged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("live.csv");
        let mut recorder = Recorder::open(&path, PersistMode::Append).unwrap();

        assert!(recorder.record(reading("10:00:00", 24.5, None)).is_err());
        assert!(recorder.is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn test_failed_rewrite_keeps_table_and_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        // a directory at the target path makes the final rename fail
        let path = dir.path().join("live.csv");
        std::fs::create_dir(&path).unwrap();
        let mut recorder = Recorder {
            path: path.clone(),
            mode: PersistMode::Rewrite,
            readings: vec![reading("09:59:50", 24.0, None)],
        };

        assert!(recorder.record(reading("10:00:00", 24.5, None)).is_err());
        assert_eq!(recorder.len(), 1);
        assert!(path.is_dir());

        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_rewrite_replaces_file_in_place() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("live.csv");
        let mut recorder = Recorder::open(&path, PersistMode::Rewrite).unwrap();
        for i in 0..3 {
            recorder
                .record(reading(&format!("10:00:0{}", i), 24.0 + i as f64, None))
                .unwrap();
        }

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("live.csv")]);
        assert_eq!(Recorder::open(&path, PersistMode::Rewrite).unwrap().len(), 3);
    }

    #[test]
    fn test_prepared_write_does_not_touch_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("live.csv");
        let mut recorder = Recorder::open(&path, PersistMode::Rewrite).unwrap();
        let row = reading("10:00:00", 24.5, None);

        let written = recorder.prepare(&row).write();
        assert!(recorder.is_empty());
        assert_eq!(Recorder::open(&path, PersistMode::Rewrite).unwrap().len(), 1);

        recorder.finish(row, written).unwrap();
        assert_eq!(recorder.len(), 1);
    }

    #[test]
    fn test_to_csv_matches_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("live.csv");
        let mut recorder = Recorder::open(&path, PersistMode::Append).unwrap();
        recorder.record(reading("10:00:00", 24.5, None)).unwrap();

        let exported = recorder.to_csv().unwrap();
        let on_disk = std::fs::read(&path).unwrap();
        assert_eq!(exported, on_disk);
    }

    #[test]
    fn test_to_csv_empty_table_has_header() {
        let dir = tempdir().unwrap();
        let recorder = Recorder::open(dir.path().join("none.csv"), PersistMode::Append).unwrap();
        let exported = String::from_utf8(recorder.to_csv().unwrap()).unwrap();
        assert_eq!(exported, "Timestamp,Temperature,Pressure,Gas,Humidity,DewPoint\n");
    }
}
