//! Contracts whose underlying collides with a reserved device name.

// Allow unwrap in tests - tests should panic on unexpected errors
#![allow(clippy::unwrap_used)]

use std::fs::{self, File};
use std::path::Path;

use chrono::NaiveDate;
use rust_decimal_macros::dec;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

use flatfile_converter::domain::{InstrumentIdentity, OptionRight};
use flatfile_converter::output::{denormalize_component, parse_entry_name};
use flatfile_converter::{Converter, ConverterSettings, ProcessingMode, Resolution};

fn settings(root: &Path, mode: ProcessingMode) -> ConverterSettings {
    ConverterSettings {
        date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        source_dir: root.join("raw"),
        destination_dir: root.join("out"),
        staging_dir: root.join("staging"),
        resolutions: vec![Resolution::Minute],
        mode,
        market: "usa".to_string(),
        file_extensions: Vec::new(),
        buffer_max: 8,
        flush_interval: 1,
        archive_threads: 0,
        remove_staged: true,
    }
}

fn expected_identity() -> InstrumentIdentity {
    InstrumentIdentity::american(
        "CON",
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
        dec!(12.5),
        OptionRight::Put,
        "usa",
    )
}

fn convert(mode: ProcessingMode) {
    let dir = tempdir().unwrap();
    let raw = dir.path().join("raw");
    fs::create_dir_all(&raw).unwrap();
    fs::write(
        raw.join("channel"),
        "10:00:00.000,TRADE,CON,P,20240315,125000,4500,3,ARCA,,1\n\
         10:00:30.000,BID,CON,P,20240315,125000,4400,2,ARCA,,2\n",
    )
    .unwrap();

    let summary = Converter::new(settings(dir.path(), mode))
        .unwrap()
        .run(&CancellationToken::new())
        .unwrap();
    assert_eq!(summary.archives_succeeded, 1);

    let underlying_dir = dir.path().join("out/option/usa/minute/^con");
    let archive = underlying_dir.join("20240102_put_125000_20240315.zip");
    assert!(archive.is_file(), "missing {}", archive.display());
    assert!(!dir.path().join("out/option/usa/minute/con").exists());

    let component = underlying_dir.file_name().unwrap().to_string_lossy().into_owned();
    assert_eq!(denormalize_component(&component), "con");

    let zip = zip::ZipArchive::new(File::open(&archive).unwrap()).unwrap();
    let mut names: Vec<String> = zip.file_names().map(str::to_string).collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            "20240102_^con_minute_quote_american_put_125000_20240315.csv",
            "20240102_^con_minute_trade_american_put_125000_20240315.csv",
        ]
    );

    for name in &names {
        let parsed = parse_entry_name(name, "usa").unwrap();
        assert_eq!(parsed.instrument, expected_identity());
        assert_eq!(parsed.date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(parsed.resolution, Resolution::Minute);
    }
}

#[test]
fn test_reserved_underlying_staged() {
    convert(ProcessingMode::Staged);
}

#[test]
fn test_reserved_underlying_in_memory() {
    convert(ProcessingMode::InMemory);
}
