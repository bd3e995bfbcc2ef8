//! One-shot launcher for the `detect` subcommand
//!
//! Detects the stack in a directory, picks a free port near the stack's
//! default and either prints the result or runs the first command in the
//! foreground with inherited stdio.

use log::{info, warn};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::config::DetectArgs;
use crate::detect::detect;
use crate::ports::{allocate, DEFAULT_MAX_ATTEMPTS};
use crate::process::{render_argv, LaunchPlan};

/// What the launcher resolved for a directory
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchReport {
    pub dir: PathBuf,
    pub framework: String,
    /// One plan per detected command, bound to `port`
    pub plans: Vec<LaunchPlan>,
    pub port: u16,
    /// Detection env merged with each plan's env and `PORT`
    pub env: BTreeMap<String, String>,
}

impl LaunchReport {
    /// Human-readable summary, one field per line
    pub fn summary(&self) -> String {
        let mut lines = vec![format!("  Framework : {}", self.framework)];
        if let [plan] = self.plans.as_slice() {
            lines.push(format!("  Command   : {}", plan.display()));
        } else {
            for (idx, plan) in self.plans.iter().enumerate() {
                lines.push(format!("  Command {}: {}", idx + 1, plan.display()));
            }
        }
        lines.push(format!("  PORT      : {}", self.port));
        lines.join("\n")
    }
}

/// Detect `dir` and bind its commands to a free port at or above
/// `preferred` (or the stack default).
pub fn prepare(dir: &Path, preferred: Option<u16>) -> Result<LaunchReport, String> {
    let detection = detect(dir);
    if !detection.detected {
        let reason = detection.reason.unwrap_or_default();
        return Err(format!("No framework detected in {}: {}", dir.display(), reason));
    }

    let desired = preferred
        .filter(|p| *p != 0)
        .or(detection.default_port)
        .ok_or_else(|| format!("No default port known for {}", detection.stack))?;
    let port = allocate(desired, DEFAULT_MAX_ATTEMPTS)
        .ok_or_else(|| format!("Could not find a free port near {}", desired))?;
    if port != desired {
        warn!("PORT {} in use, switching to {}", desired, port);
    }

    let mut env = detection.env.clone();
    let mut plans = Vec::with_capacity(detection.commands.len());
    for argv in detection.commands {
        let plan = render_argv(argv, dir, port)?;
        env.extend(plan.env.clone());
        plans.push(plan);
    }
    env.insert("PORT".to_string(), port.to_string());

    Ok(LaunchReport {
        dir: dir.to_path_buf(),
        framework: detection.stack,
        plans,
        port,
        env,
    })
}

/// Run the first plan in the foreground and return its exit code
pub async fn run_foreground(report: &LaunchReport) -> Result<i32, String> {
    let Some(plan) = report.plans.first() else {
        return Err("Nothing to run".to_string());
    };
    if report.plans.len() > 1 {
        warn!("Multiple commands detected, running the first command only");
    }

    info!("Launching {} on port {}", plan.display(), report.port);
    let status = Command::new(&plan.program)
        .args(&plan.args)
        .current_dir(&report.dir)
        .envs(&report.env)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .map_err(|e| format!("Failed to run '{}': {}", plan.program, e))?;

    match status.code() {
        Some(0) => info!("Process exited cleanly"),
        Some(code) => warn!("Process exited with {}", code),
        None => warn!("Process terminated by signal"),
    }
    Ok(status.code().unwrap_or(1))
}

/// Entry point of the `detect` subcommand
pub async fn run(args: DetectArgs) -> Result<i32, String> {
    let dir = args
        .dir
        .canonicalize()
        .map_err(|e| format!("Failed to resolve {}: {}", args.dir.display(), e))?;
    let report = prepare(&dir, args.port)?;
    println!("{}", report.summary());

    if args.print {
        return Ok(0);
    }
    run_foreground(&report).await
}

// ============================================================================
// TESTS
// ============================================================================
