// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use test_log::test;
use xtdb::{resample, EncodingType, EngineConfig, TagConfig, TimeUnit, Value, ValueType};

#[test]
fn wal_replay_recovers_unflushed_writes_after_restart() -> xtdb::Result<()> {
    let dir = tempfile::tempdir().unwrap();

    {
        let engine = EngineConfig::new(dir.path()).layout(1, 16).flush_threshold(1_000).open()?;
        for i in 0..5 {
            engine.write_point(1, i * 1_000, Value::F64(f64::from(i as i32)), xtdb::quality::GOOD)?;
        }
        // Dropped without an explicit flush: only the WAL has these points.
    }

    let engine = EngineConfig::new(dir.path()).layout(1, 16).flush_threshold(1_000).open()?;
    let points = engine.query_points(1, 0, 10_000)?;
    assert_eq!(points.len(), 5);
    assert_eq!(points[0].timestamp_us, 0);
    assert_eq!(points[4].timestamp_us, 4_000);
    Ok(())
}

#[test]
fn chunk_rolls_over_multiple_times_under_a_small_layout() -> xtdb::Result<()> {
    let dir = tempfile::tempdir().unwrap();
    let engine = EngineConfig::new(dir.path()).layout(1, 2).flush_threshold(2).open()?;

    for i in 0..40 {
        engine.write_point(1, i * 1_000, Value::F64(f64::from(i as i32)), xtdb::quality::GOOD)?;
    }
    engine.seal_current_chunk()?;

    assert!(engine.write_stats().chunks_sealed >= 1);
    let points = engine.query_points(1, 0, 40_000)?;
    assert_eq!(points.len(), 40);
    for (i, point) in points.iter().enumerate() {
        assert_eq!(point.timestamp_us, i as i64 * 1_000);
    }
    Ok(())
}

#[test]
fn swinging_door_tag_compresses_linear_ramp_within_tolerance() -> xtdb::Result<()> {
    let dir = tempfile::tempdir().unwrap();
    let engine = EngineConfig::new(dir.path()).layout(1, 16).flush_threshold(1_000).open()?;

    engine.register_tag(
        2,
        TagConfig {
            value_type: ValueType::F64,
            time_unit: TimeUnit::Us,
            encoding_type: EncodingType::SwingingDoor,
            encoding_param1: 0.5,
            encoding_param2: 1.0,
        },
    );

    for i in 0..200 {
        engine.write_point(2, i * 1_000, Value::F64(10.0 * f64::from(i as i32)), xtdb::quality::GOOD)?;
    }
    engine.flush()?;

    let points = engine.query_points(2, 0, 200_000)?;
    assert!(points.len() < 200, "expected lossy compression to retain fewer than 200 points, got {}", points.len());
    assert_eq!(points[0].timestamp_us, 0);
    assert_eq!(points[0].value.as_f64(), 0.0);

    let last = points.last().unwrap();
    assert_eq!(last.timestamp_us, 199_000);
    assert!((last.value.as_f64() - 1_990.0).abs() <= 0.5);
    Ok(())
}

#[test]
fn archive_pass_migrates_old_blocks_and_query_still_sees_them() -> xtdb::Result<()> {
    let dir = tempfile::tempdir().unwrap();
    let engine = EngineConfig::new(dir.path()).layout(1, 16).flush_threshold(4).archive_min_age_us(0).open()?;

    for i in 0..20 {
        engine.write_point(1, i * 1_000, Value::F64(f64::from(i as i32)), xtdb::quality::GOOD)?;
    }
    engine.flush()?;

    let report = engine.run_archive_pass(1)?;
    assert!(report.blocks_archived > 0);
    assert_eq!(report.blocks_failed, 0);

    let points = engine.query_points(1, 0, 20_000)?;
    assert_eq!(points.len(), 20);
    assert!(engine.read_stats().blocks_read_compact > 0);
    Ok(())
}

#[test]
fn resample_aggregates_windows_across_a_longer_span() -> xtdb::Result<()> {
    let records: Vec<_> = (0..3_600)
        .map(|i| xtdb::MemRecord {
            timestamp_us: i * 1_000_000,
            value: Value::F64(f64::from(i as i32)),
            quality: xtdb::quality::GOOD,
        })
        .collect();

    let windows = resample(&records, 60 * 1_000_000)?;
    assert_eq!(windows.len(), 60);
    assert_eq!(windows[0].count, 60);
    assert_eq!(windows[0].min, 0.0);
    assert_eq!(windows[0].max, 59.0);
    assert_eq!(windows[0].first, 0.0);
    assert_eq!(windows[0].last, 59.0);
    assert_eq!(windows[0].quality, xtdb::quality::GOOD);
    Ok(())
}
