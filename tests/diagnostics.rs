mod common;

use std::sync::Mutex;

use log::{Level, LevelFilter, Log, Metadata, Record};

use docxide_layout::{EngineConfig, EngineOptions, MeasurementEngine};

use common::{BlockSurface, SurfaceLog};

static RECORDS: Mutex<Vec<(Level, String)>> = Mutex::new(Vec::new());

struct Capture;

impl Log for Capture {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if let Ok(mut records) = RECORDS.lock() {
            records.push((record.level(), record.args().to_string()));
        }
    }

    fn flush(&self) {}
}

fn engine(dev_diagnostics: bool) -> MeasurementEngine {
    MeasurementEngine::initialize(
        EngineOptions::new(BlockSurface::new(SurfaceLog::new(true))).config(EngineConfig {
            dev_diagnostics,
            ..EngineConfig::default()
        }),
    )
}

fn rejection_levels() -> Vec<Level> {
    RECORDS
        .lock()
        .expect("records")
        .drain(..)
        .filter(|(_, message)| message.contains("layout override rejected"))
        .map(|(level, _)| level)
        .collect()
}

#[test]
fn each_engine_keeps_its_own_diagnostics_level() {
    log::set_logger(&Capture).expect("install logger");
    log::set_max_level(LevelFilter::Trace);

    let loud = engine(true);
    // Built second: must not change how the first engine reports.
    let quiet = engine(false);

    assert!(loud.apply_layout_override(&serde_json::json!(3), None).is_none());
    assert_eq!(rejection_levels(), vec![Level::Warn]);

    assert!(quiet.apply_layout_override(&serde_json::json!("page"), None).is_none());
    assert_eq!(rejection_levels(), vec![Level::Debug]);

    let loud_again = engine(true);
    assert!(quiet.apply_layout_override(&serde_json::json!([]), None).is_none());
    assert!(loud_again.apply_layout_override(&serde_json::json!(null), None).is_none());
    assert_eq!(rejection_levels(), vec![Level::Debug, Level::Warn]);
}
