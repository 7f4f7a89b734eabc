//! CSV data source: parsing, hashing and error reporting.

use std::fs;
use std::path::{Path, PathBuf};

use barsim_core::data::{DataError, DataSource};
use barsim_core::domain::{AssetClass, InstrumentId};
use barsim_runner::data_loader::parse_timestamp;
use barsim_runner::{CsvDataSource, LoadError};

const INSTRUMENTS: &str = "\
id,symbol,asset_class,lot_size,tick_size
X,Stock X,STOCK,100,0.01
B,,FUND,1,0.001
";

const BARS: &str = "\
instrument,timestamp,open,high,low,close,volume
X,2024-01-02,10,10.5,9.5,10,1000000
X,2024-01-03 15:00:00,11,12.5,10.5,12,1000000
B,2024-01-02,1.0,1.0,1.0,1.0,500000
B,2024-01-04,1.2,1.2,1.2,1.2,500000
";

fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn id(s: &str) -> InstrumentId {
    InstrumentId::from(s)
}

#[test]
fn loads_instruments_bars_and_calendar() {
    let dir = tempfile::tempdir().unwrap();
    let bars = write(dir.path(), "bars.csv", BARS);
    let instruments = write(dir.path(), "instruments.csv", INSTRUMENTS);

    let data = CsvDataSource::load(&bars, &instruments, None).unwrap();
    assert_eq!(data.bar_count(), 4);

    let x = data.instrument(&id("X")).unwrap();
    assert_eq!(x.symbol, "Stock X");
    assert_eq!(x.lot_size, 100.0);
    let b = data.instrument(&id("B")).unwrap();
    assert_eq!(b.symbol, "B", "empty symbol falls back to the id");
    assert_eq!(b.asset_class, AssetClass::Fund);

    let calendar = data.trading_calendar();
    let expected: Vec<_> = ["2024-01-02", "2024-01-03", "2024-01-04"]
        .iter()
        .map(|d| parse_timestamp(d).unwrap())
        .collect();
    assert_eq!(calendar, expected);

    let bar = data.get_bar(&id("X"), calendar[1]).unwrap();
    assert_eq!(bar.close, 12.0);
    assert!(matches!(
        data.get_bar(&id("B"), calendar[1]),
        Err(DataError::Unavailable { .. })
    ));
}

#[test]
fn dataset_hash_tracks_file_contents() {
    let dir = tempfile::tempdir().unwrap();
    let bars = write(dir.path(), "bars.csv", BARS);
    let instruments = write(dir.path(), "instruments.csv", INSTRUMENTS);

    let first = CsvDataSource::load(&bars, &instruments, None).unwrap();
    let again = CsvDataSource::load(&bars, &instruments, None).unwrap();
    assert_eq!(first.dataset_hash(), again.dataset_hash());
    assert_eq!(first.dataset_hash().len(), 64);

    write(dir.path(), "bars.csv", &BARS.replace("1000000", "999999"));
    let changed = CsvDataSource::load(&bars, &instruments, None).unwrap();
    assert_ne!(first.dataset_hash(), changed.dataset_hash());
}

#[test]
fn suspension_file_marks_instruments() {
    let dir = tempfile::tempdir().unwrap();
    let bars = write(dir.path(), "bars.csv", BARS);
    let instruments = write(dir.path(), "instruments.csv", INSTRUMENTS);
    let suspended = write(
        dir.path(),
        "suspended.csv",
        "instrument,timestamp\nX,2024-01-03\n",
    );

    let data = CsvDataSource::load(&bars, &instruments, Some(&suspended)).unwrap();
    let day3 = parse_timestamp("2024-01-03").unwrap();
    let day2 = parse_timestamp("2024-01-02").unwrap();
    assert!(data.is_suspended(&id("X"), day3));
    assert!(!data.is_suspended(&id("X"), day2));
}

#[test]
fn undeclared_instrument_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let bars = write(
        dir.path(),
        "bars.csv",
        &format!("{BARS}Z,2024-01-02,1,1,1,1,100\n"),
    );
    let instruments = write(dir.path(), "instruments.csv", INSTRUMENTS);

    let err = CsvDataSource::load(&bars, &instruments, None).unwrap_err();
    assert!(
        matches!(&err, LoadError::UndeclaredInstrument { instrument, .. } if instrument == "Z"),
        "got {err}"
    );
}

#[test]
fn bad_timestamp_reports_its_line() {
    let dir = tempfile::tempdir().unwrap();
    let bars = write(
        dir.path(),
        "bars.csv",
        "instrument,timestamp,open,high,low,close,volume\n\
         X,2024-01-02,10,10,10,10,100\n\
         X,03/01/2024,10,10,10,10,100\n",
    );
    let instruments = write(dir.path(), "instruments.csv", INSTRUMENTS);

    match CsvDataSource::load(&bars, &instruments, None) {
        Err(LoadError::Timestamp { line, value, .. }) => {
            assert_eq!(line, 3);
            assert_eq!(value, "03/01/2024");
        }
        other => panic!("expected timestamp error, got {other:?}"),
    }
}

#[test]
fn malformed_number_is_a_csv_error() {
    let dir = tempfile::tempdir().unwrap();
    let bars = write(dir.path(), "bars.csv", &BARS.replace("10.5", "ten"));
    let instruments = write(dir.path(), "instruments.csv", INSTRUMENTS);

    let err = CsvDataSource::load(&bars, &instruments, None).unwrap_err();
    assert!(matches!(err, LoadError::Csv { .. }), "got {err}");
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let instruments = write(dir.path(), "instruments.csv", INSTRUMENTS);

    let err = CsvDataSource::load(&dir.path().join("nope.csv"), &instruments, None).unwrap_err();
    assert!(matches!(err, LoadError::Io { .. }));
}
