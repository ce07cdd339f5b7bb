//! `procuresense batch`: validate many candidates concurrently.
//!
//! Input is JSON lines, one request per line:
//!
//! ```text
//! {"id": "po-1", "candidate": "...", "payload": {"discount_pct": 20}, "session": ["..."]}
//! ```
//!
//! Output is one JSON line per request, in input order.

use super::{BoxError, Engine, Fragments};
use procuresense_config::AppConfig;
use procuresense_critic::{ComplianceReport, ComplianceStatus};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub candidate: String,
    #[serde(default = "empty_object")]
    pub payload: serde_json::Value,
    #[serde(flatten)]
    pub fragments: Fragments,
}

fn empty_object() -> serde_json::Value {
    serde_json::json!({})
}

/// One output line. Exactly one of `report` and `error` is set.
#[derive(Debug, Serialize)]
pub struct BatchResult {
    pub line: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ComplianceReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchResult {
    fn status(&self) -> Option<ComplianceStatus> {
        self.report.as_ref().map(ComplianceReport::status)
    }
}

pub async fn run(config: AppConfig, input: &Path, concurrency: usize) -> Result<(), BoxError> {
    let content = tokio::fs::read_to_string(input)
        .await
        .map_err(|e| format!("Failed to read {}: {e}", input.display()))?;
    let engine = Arc::new(Engine::load(&config)?);

    let results = process(engine, &content, concurrency).await?;

    let mut flagged = 0;
    let mut failed = 0;
    for result in &results {
        match result.status() {
            Some(ComplianceStatus::Flagged) => flagged += 1,
            None => failed += 1,
            _ => {}
        }
        println!("{}", serde_json::to_string(result)?);
    }
    info!(total = results.len(), flagged, failed, "Batch complete");
    Ok(())
}

/// Validate every non-blank line, at most `concurrency` at a time.
///
/// A bad line yields an error result rather than aborting the batch.
pub async fn process(
    engine: Arc<Engine>,
    content: &str,
    concurrency: usize,
) -> Result<Vec<BatchResult>, BoxError> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut handles = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let line_no = idx + 1;
        let request: BatchRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                warn!(line = line_no, error = %e, "Skipping unparseable request");
                handles.push(tokio::spawn(async move {
                    BatchResult {
                        line: line_no,
                        id: None,
                        report: None,
                        error: Some(format!("invalid request: {e}")),
                    }
                }));
                continue;
            }
        };

        let permit = Arc::clone(&semaphore).acquire_owned().await?;
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            let id = request.id.clone();
            let outcome = tokio::task::spawn_blocking(move || validate_one(&engine, &request)).await;
            drop(permit);
            let (report, error) = match outcome {
                Ok(Ok(report)) => (Some(report), None),
                Ok(Err(e)) => (None, Some(e.to_string())),
                Err(e) => (None, Some(format!("validation task failed: {e}"))),
            };
            BatchResult {
                line: line_no,
                id,
                report,
                error,
            }
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await?);
    }
    Ok(results)
}

fn validate_one(engine: &Engine, request: &BatchRequest) -> Result<ComplianceReport, BoxError> {
    let context = engine.build_context(&request.fragments)?;
    Ok(engine.critic.validate_json(
        &request.candidate,
        &request.payload,
        &context.validation_evidence(),
    )?)
}
