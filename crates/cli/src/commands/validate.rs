//! `procuresense validate`: run the critic over one candidate.

use super::{BoxError, ContextInputs, Engine};
use procuresense_config::AppConfig;
use procuresense_critic::ComplianceStatus;
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Debug, clap::Args)]
pub struct ValidateArgs {
    /// Candidate text file, or `-` for stdin
    pub candidate: PathBuf,

    /// Request payload as inline JSON
    #[arg(long, conflicts_with = "payload_file")]
    pub payload: Option<String>,

    /// Request payload JSON file
    #[arg(long)]
    pub payload_file: Option<PathBuf>,

    #[command(flatten)]
    pub inputs: ContextInputs,

    /// Print only the final text instead of the full report
    #[arg(long)]
    pub text: bool,
}

pub fn run(config: &AppConfig, args: &ValidateArgs) -> Result<ComplianceStatus, BoxError> {
    let engine = Engine::load(config)?;
    let candidate = read_candidate(&args.candidate)?;
    let payload = read_payload(args.payload.as_deref(), args.payload_file.as_deref())?;

    let context = engine.build_context(&args.inputs.load()?)?;
    let report = engine
        .critic
        .validate_json(&candidate, &payload, &context.validation_evidence())?;

    if args.text {
        println!("{}", report.final_text());
    } else {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    if !report.is_shippable() {
        eprintln!("FLAGGED: unresolved {}", report.unresolved().join(", "));
    }
    Ok(report.status())
}

fn read_candidate(path: &Path) -> Result<String, BoxError> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        return Ok(buf);
    }
    std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {e}", path.display()).into())
}

/// Missing payload means an empty object.
pub fn read_payload(
    inline: Option<&str>,
    file: Option<&Path>,
) -> Result<serde_json::Value, BoxError> {
    let raw = match (inline, file) {
        (Some(json), _) => json.to_string(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {e}", path.display()))?,
        (None, None) => return Ok(serde_json::json!({})),
    };
    Ok(serde_json::from_str(&raw)?)
}
