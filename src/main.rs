use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use award_enrich::{
    CandidateRecord, CheckpointStore, Engine, EngineConfig, FileCheckpointStore,
    JsonFileMetricsSink, JsonLinesReader, JsonLinesResultSink, SourceRecord,
};

const USAGE: &str =
    "usage: award-enrich <config.yaml> <candidates.jsonl> <source.jsonl> <results.jsonl> [metrics.json]";

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn Error + Send + Sync>> {
    #[cfg(feature = "subscriber")]
    award_enrich::telemetry::init_tracing("info")?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [config, candidates, source, results, rest @ ..] = args.as_slice() else {
        eprintln!("{USAGE}");
        return Ok(ExitCode::from(64));
    };

    let mut config = EngineConfig::from_file(config)?.with_env_overrides(std::env::vars())?;
    // results stream to the output file only
    config.retain_results = false;
    let candidates = JsonLinesReader::<_, CandidateRecord>::open(candidates)?
        .collect::<Result<Vec<_>, _>>()?;

    let metrics_path = rest
        .first()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(format!("{results}.metrics.json")));

    let checkpoints = FileCheckpointStore::new(format!("{source}.checkpoint"));
    let resuming = config.enable_progress_tracking && checkpoints.load()?.is_some();
    let result_sink = if resuming {
        JsonLinesResultSink::append(results)?
    } else {
        JsonLinesResultSink::create(results)?
    };

    let engine = Engine::builder(config)
        .candidates(candidates)
        .result_sink(Arc::new(result_sink))
        .metrics_sink(Arc::new(JsonFileMetricsSink::new(metrics_path)))
        .checkpoint_store(checkpoints)
        .build()?;

    let report = engine
        .run(JsonLinesReader::<_, SourceRecord>::open(source)?)
        .await?;

    println!(
        "{} records, {} matched ({:.4}), quality gate {:?}",
        report.metrics.total_records,
        report.metrics.matched_records,
        report.metrics.match_rate,
        report.metrics.gate.verdict
    );

    Ok(if report.passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}
