mod common;

use std::io::Cursor;
use std::sync::Arc;

use award_enrich::{
    ConfigError, Engine, EngineConfig, EngineError, IdentifierKind, JsonFileMetricsSink,
    JsonLinesReader, LookupIndex, NameConfig, RecordDefect, SourceRecord, TierConfigError, TierThresholds,
};

use common::*;

#[test]
fn low_threshold_at_or_above_high_is_rejected_at_startup() {
    for (high, low) in [(80, 80), (70, 90)] {
        let err = builder(EngineConfig {
            high_confidence_threshold: high,
            low_confidence_threshold: low,
            ..config()
        })
        .build()
        .expect_err("invalid thresholds");
        assert!(matches!(
            err,
            EngineError::Config(ConfigError::Thresholds(TierConfigError::LowNotBelowHigh { .. }))
        ));
    }
}

#[test]
fn zero_chunk_size_is_rejected() {
    let err = builder(EngineConfig {
        chunk_size: 0,
        ..config()
    })
    .build()
    .expect_err("chunk_size 0");
    assert!(matches!(err, EngineError::Config(ConfigError::ZeroChunkSize)));
}

#[test]
fn yaml_with_bad_thresholds_never_loads() {
    let err = EngineConfig::from_yaml("high_confidence_threshold: 70\nlow_confidence_threshold: 75\n")
        .expect_err("rejected");
    assert!(matches!(err, ConfigError::Thresholds(_)));
}

#[test]
fn prebuilt_index_must_share_name_normalization() {
    let names = NameConfig {
        fold_abbreviations: false,
        ..NameConfig::default()
    };
    let index = Arc::new(LookupIndex::build(candidates(), &names));
    let err = Engine::builder(config())
        .index(index)
        .build()
        .expect_err("normalization differs");
    assert!(matches!(err, EngineError::Config(ConfigError::IndexNameConfigMismatch)));
}

#[tokio::test]
async fn malformed_records_are_counted_not_raised() {
    let mut records = awards();
    records.push(SourceRecord::new("   ").with_primary_id("UEI0001"));
    records.push(SourceRecord::new("award-12").with_primary_id("--"));
    records.push(SourceRecord::new("award-13"));

    let report = engine(config()).run(ok(records)).await.expect("run");
    assert_eq!(report.metrics.total_records, 13);
    assert_eq!(report.metrics.malformed_records, 3);
    assert_eq!(report.metrics.matched_records, 8);

    let defects: Vec<_> = report.results[10..].iter().map(|r| r.defect()).collect();
    assert_eq!(
        defects,
        vec![
            Some(RecordDefect::BlankId),
            Some(RecordDefect::UnparseableIdentifier(IdentifierKind::Primary)),
            Some(RecordDefect::NothingToMatch),
        ]
    );
}

#[tokio::test]
async fn malformed_share_can_fail_the_gate() {
    let mut records = awards();
    records.push(SourceRecord::new("award-11"));
    let report = engine(EngineConfig {
        match_rate_threshold: 0.5,
        max_malformed_rate: Some(0.05),
        ..config()
    })
    .run(ok(records))
    .await
    .expect("run");
    assert!(!report.passed());
    assert_eq!(report.metrics.gate.reasons.len(), 1);
}

#[tokio::test]
async fn too_many_failed_chunks_aborts_without_artifact() {
    let dir = tempfile::tempdir().expect("tempdir");
    let metrics_path = dir.path().join("metrics.json");
    let engine = builder(EngineConfig {
        chunk_size: 2,
        max_failed_chunks: 1,
        ..config()
    })
    .result_sink(Arc::new(RejectingSink))
    .metrics_sink(Arc::new(JsonFileMetricsSink::new(&metrics_path)))
    .build()
    .expect("engine");

    let err = engine.run(ok(awards())).await.expect_err("aborts");
    assert!(matches!(
        err,
        EngineError::TooManyFailedChunks {
            failed: 2,
            limit: 1
        }
    ));
    assert!(!metrics_path.exists());
}

#[tokio::test]
async fn permanent_sink_errors_are_not_retried() {
    let engine = builder(EngineConfig {
        chunk_size: 100,
        ..config()
    })
    .result_sink(Arc::new(RejectingSink))
    .build()
    .expect("engine");

    let report = engine.run(ok(awards())).await.expect("one failure is tolerated");
    assert_eq!(report.metrics.failed_chunks, 1);
    assert_eq!(report.metrics.retry_attempts, 0);
}

#[tokio::test]
async fn source_read_error_is_fatal_and_reports_offset() {
    let source = awards()
        .into_iter()
        .enumerate()
        .map(|(i, r)| if i == 3 { Err(format!("line {}: bad json", i + 1)) } else { Ok(r) });
    let err = engine(EngineConfig {
        chunk_size: 2,
        ..config()
    })
    .run(source)
    .await
    .expect_err("fatal");
    match err {
        EngineError::SourceRead { offset, reason } => {
            assert_eq!(offset, 3);
            assert!(reason.contains("bad json"));
        }
        other => panic!("unexpected error {other}"),
    }
}

#[tokio::test]
async fn undecodable_source_lines_are_counted_and_skipped() {
    let input = concat!(
        "{\"id\":\"award-01\",\"primary_id\":\"UEI0001\"}\n",
        "{\"name\":\"Globex Corps\"}\n",
        "{\"id\":\"award-03\",\"primary_id\":\n",
        "{\"id\":\"award-04\",\"name\":\"Tyrell Corps\"}\n",
    );
    let source = JsonLinesReader::<_, SourceRecord>::new(Cursor::new(input));
    let report = engine(EngineConfig {
        chunk_size: 2,
        match_rate_threshold: 0.5,
        ..config()
    })
    .run(source)
    .await
    .expect("bad lines do not abort the run");

    assert_eq!(report.metrics.total_records, 4);
    assert_eq!(report.metrics.malformed_records, 2);
    assert_eq!(report.metrics.matched_records, 2);
    assert_eq!(report.metrics.failed_chunks, 0);
    let defects: Vec<_> = report.results.iter().map(|r| r.defect()).collect();
    assert_eq!(
        defects,
        vec![
            None,
            Some(RecordDefect::BlankId),
            Some(RecordDefect::Unreadable),
            None
        ]
    );
    assert!(report.passed());
}

#[test]
fn medium_band_is_validated_with_the_rest() {
    assert!(TierThresholds::new(90, 75).expect("valid").with_medium(95).is_err());
    let err = builder(EngineConfig {
        medium_confidence_threshold: Some(60),
        ..config()
    })
    .build()
    .expect_err("medium below low");
    assert!(matches!(err, EngineError::Config(ConfigError::Thresholds(_))));
}
