//! brush_replay - feed a recorded candidate timeline through the accumulator
//!
//! Each input line is `candidate,elapsed[,now]` where `candidate` is
//! `1/0/true/false`. When `now` is omitted it is the running sum of elapsed
//! values. Blank lines and `#` comments are skipped. One JSON view is printed
//! per line; the final line carries the proof, if any.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::Serialize;
use std::io::{BufRead, BufReader, Write};

use brush_witness::session::{AccumulatorView, AdvanceOutcome};
use brush_witness::{SessionAccumulator, SessionConfig};

#[derive(Parser, Debug)]
#[command(
    name = "brush_replay",
    about = "Replay a candidate timeline through the brushing accumulator"
)]
struct Args {
    /// Timeline file (reads stdin when omitted)
    #[arg(long, value_name = "PATH")]
    input: Option<String>,

    /// Seconds of activity required
    #[arg(long, alias = "required-sec", default_value_t = 20.0)]
    required_duration: f64,

    /// Longest gap that still counts, in seconds
    #[arg(long, alias = "grace-sec", default_value_t = 0.75)]
    grace_duration: f64,

    /// Confidence floor recorded on the proof
    #[arg(long, alias = "conf-thres", default_value_t = 0.40)]
    confidence_floor: f32,

    /// Only print the final view
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Serialize)]
struct ReplayStep<'a> {
    line: usize,
    outcome: &'a str,
    #[serde(flatten)]
    view: AccumulatorView,
}

fn outcome_label(outcome: AdvanceOutcome) -> &'static str {
    match outcome {
        AdvanceOutcome::Accumulated => "accumulated",
        AdvanceOutcome::Paused => "paused",
        AdvanceOutcome::Completed => "completed",
        AdvanceOutcome::AlreadyComplete => "already_complete",
    }
}

fn parse_line(line: &str, clock: f64) -> Result<(bool, f64, f64)> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() < 2 || fields.len() > 3 {
        return Err(anyhow!("expected candidate,elapsed[,now]"));
    }
    let candidate = match fields[0].to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => true,
        "0" | "false" | "no" => false,
        other => return Err(anyhow!("invalid candidate flag '{}'", other)),
    };
    let elapsed: f64 = fields[1]
        .parse()
        .map_err(|_| anyhow!("invalid elapsed '{}'", fields[1]))?;
    let now = match fields.get(2) {
        Some(raw) => raw.parse().map_err(|_| anyhow!("invalid now '{}'", raw))?,
        None => clock + elapsed,
    };
    Ok((candidate, elapsed, now))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let config = SessionConfig::new(
        args.required_duration,
        args.grace_duration,
        args.confidence_floor,
    );
    let mut accumulator = SessionAccumulator::new(config)?;

    let reader: Box<dyn BufRead> = match &args.input {
        Some(path) => Box::new(BufReader::new(
            std::fs::File::open(path).with_context(|| format!("failed to open {}", path))?,
        )),
        None => Box::new(BufReader::new(std::io::stdin())),
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut clock = 0.0;
    let mut last = None;
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line_no = index + 1;
        let (candidate, elapsed, now) =
            parse_line(trimmed, clock).with_context(|| format!("line {}", line_no))?;
        clock = now;
        let outcome = accumulator
            .advance(candidate, elapsed, now)
            .with_context(|| format!("line {}", line_no))?;
        let step = ReplayStep {
            line: line_no,
            outcome: outcome_label(outcome),
            view: accumulator.view(),
        };
        if !args.quiet {
            serde_json::to_writer(&mut out, &step)?;
            writeln!(out)?;
        }
        last = Some(outcome);
    }

    if args.quiet {
        let step = ReplayStep {
            line: 0,
            outcome: last.map(outcome_label).unwrap_or("none"),
            view: accumulator.view(),
        };
        serde_json::to_writer(&mut out, &step)?;
        writeln!(out)?;
    }
    match accumulator.proof() {
        Some(proof) => log::info!(
            "proof issued at {:.3}s with {:.3}s accumulated",
            proof.completed_at,
            proof.accumulated_duration_at_completion
        ),
        None => log::warn!(
            "no proof: {:.3}s of {:.3}s accumulated",
            accumulator.accumulated_duration(),
            config.required_duration
        ),
    }
    Ok(())
}
