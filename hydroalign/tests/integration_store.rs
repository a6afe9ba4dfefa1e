//! Integration tests for the array store lifecycle.
//!
//! Create, reopen, extend with variables across sessions, and check the
//! persisted layout that other tools depend on.

use hydroalign::store::TIME_NAME;
use hydroalign::timestamp::TIMESTAMP_STRLEN;
use hydroalign::{ArrayStore, HydroError, OpenMode, TimeAxis, Timestamp};
use tempfile::tempdir;

fn hourly_axis(hours: usize) -> TimeAxis {
    let start = Timestamp::parse("2015-06-01 00:00:00 PST").unwrap();
    TimeAxis::regular(&start, 3600, hours).unwrap()
}

#[test]
fn test_full_store_lifecycle() {
    let temp_dir = tempdir().unwrap();
    let store_path = temp_dir.path().join("lifecycle");
    let axis = hourly_axis(48);

    // Session 1: create and add one variable
    {
        let mut store = ArrayStore::create(&store_path, &axis, Some(-9999.0)).unwrap();
        let mut pending = store.declare_variable("stage", store.fill_value()).unwrap();
        pending.write_at(0, &[1.5; 24]).unwrap();
        pending.set_attribute("units", "ft");
        pending.commit().unwrap();
    }

    // Session 2: reopen for writing and add another
    {
        let mut store = ArrayStore::open(&store_path, OpenMode::ReadWrite).unwrap();
        assert_eq!(store.read_axis().unwrap(), axis);
        assert!(store.has_variable("stage"));

        let mut pending = store.declare_variable("flow", store.fill_value()).unwrap();
        pending.write_at(24, &[300.0; 24]).unwrap();
        pending.commit().unwrap();
    }

    // Session 3: read-only inspection
    let store = ArrayStore::open(&store_path, OpenMode::ReadOnly).unwrap();
    let names: Vec<&str> = store.variables().iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, ["stage", "flow"]);

    let stage = store.read_variable("stage").unwrap();
    assert_eq!(stage.len(), 48);
    assert!(stage[..24].iter().all(|&v| v == 1.5));
    assert!(stage[24..].iter().all(|&v| v == -9999.0));

    let flow = store.read_variable("flow").unwrap();
    assert!(flow[..24].iter().all(|&v| v == -9999.0));
    assert!(flow[24..].iter().all(|&v| v == 300.0));

    assert_eq!(store.variable("stage").unwrap().attributes["units"], "ft");
}

#[test]
fn test_persisted_layout() {
    let temp_dir = tempdir().unwrap();
    let store_path = temp_dir.path().join("layout");
    let axis = hourly_axis(3);
    drop(ArrayStore::create(&store_path, &axis, None).unwrap());

    let meta: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(store_path.join("meta.json")).unwrap())
            .unwrap();
    assert_eq!(meta["dimension"]["name"], TIME_NAME);
    assert_eq!(meta["dimension"]["length"], 3);
    assert_eq!(meta["time_variable"]["strlen"], TIMESTAMP_STRLEN);
    assert!(meta["fill_value"].is_null());

    // 64-byte header plus one fixed-width string per axis position.
    let time_bytes = std::fs::read(store_path.join("time.slab")).unwrap();
    assert_eq!(time_bytes.len(), 64 + 3 * TIMESTAMP_STRLEN);
    let first = &time_bytes[64..64 + TIMESTAMP_STRLEN];
    assert!(first.starts_with(b"2015-06-01 00:00:00 PST\0"));
}

#[test]
fn test_reader_sees_only_committed_variables() {
    let temp_dir = tempdir().unwrap();
    let store_path = temp_dir.path().join("visibility");
    let mut writer = ArrayStore::create(&store_path, &hourly_axis(4), None).unwrap();

    let mut pending = writer.declare_variable("flow", f64::NAN).unwrap();
    pending.write_at(0, &[1.0, 2.0]).unwrap();

    let reader = ArrayStore::open(&store_path, OpenMode::ReadOnly).unwrap();
    assert!(!reader.has_variable("flow"));
    drop(reader);

    pending.commit().unwrap();
    let reader = ArrayStore::open(&store_path, OpenMode::ReadOnly).unwrap();
    assert!(reader.has_variable("flow"));
}

#[test]
fn test_lock_released_after_writer_drops() {
    let temp_dir = tempdir().unwrap();
    let store_path = temp_dir.path().join("locking");

    let writer = ArrayStore::create(&store_path, &hourly_axis(2), None).unwrap();
    assert!(matches!(
        ArrayStore::open(&store_path, OpenMode::ReadWrite),
        Err(HydroError::Store(_))
    ));
    drop(writer);

    assert!(ArrayStore::open(&store_path, OpenMode::ReadWrite).is_ok());
}
