//! Classical Python strategy — cProfile run plus a rendered pstats report.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ExecutionError;
use crate::profiler::process::{self, CommandSpec};
use crate::profiler::Profiler;
use crate::task::RuntimeOptions;

/// File name of the binary cProfile dump.
const PROFILE_DUMP_FILE: &str = "profile.prof";
/// File name of the human-readable report.
const REPORT_FILE: &str = "python_profile.txt";

/// One-liner that renders a cProfile dump sorted by cumulative time.
const RENDER_SNIPPET: &str =
    "import pstats, sys; pstats.Stats(sys.argv[1]).sort_stats('cumulative').print_stats()";

/// Profiles a Python program under `cProfile`, then renders the binary dump
/// into a report sorted by cumulative cost.
pub struct PythonProfiler;

impl PythonProfiler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PythonProfiler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Profiler for PythonProfiler {
    async fn profile(
        &self,
        source: &Path,
        options: Option<&RuntimeOptions>,
    ) -> Result<PathBuf, ExecutionError> {
        let dir = source
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        let dump = dir.join(PROFILE_DUMP_FILE);

        let interpreter = options
            .and_then(|o| o.command.clone())
            .unwrap_or_else(|| "python3".to_string());

        let cwd = match options.and_then(|o| o.cwd.as_deref()) {
            Some(sub) => dir.join(sub),
            None => dir.clone(),
        };

        // Run under the deterministic profiler, dumping stats to disk.
        let mut run_args = vec![
            "-m".to_string(),
            "cProfile".to_string(),
            "-o".to_string(),
            dump.display().to_string(),
            source.display().to_string(),
        ];
        if let Some(extra) = options.and_then(|o| o.args.clone()) {
            run_args.extend(extra);
        }
        process::run(CommandSpec {
            phase: "profile",
            program: interpreter.clone(),
            args: run_args,
            envs: options.and_then(|o| o.envs.clone()).unwrap_or_default(),
            cwd: cwd.clone(),
            timeout: options
                .and_then(|o| o.timeout_seconds)
                .map(Duration::from_secs),
            max_memory_mb: options.and_then(|o| o.max_memory_mb),
        })
        .await?;

        // Render the dump, sorted by cumulative time.
        let rendered = process::run(CommandSpec {
            phase: "report",
            program: interpreter,
            args: vec![
                "-c".to_string(),
                RENDER_SNIPPET.to_string(),
                dump.display().to_string(),
            ],
            envs: Default::default(),
            cwd,
            timeout: None,
            max_memory_mb: None,
        })
        .await?;

        let report_path = dir.join(REPORT_FILE);
        tokio::fs::write(&report_path, rendered.stdout).await?;

        tracing::info!(source = %source.display(), artifact = %report_path.display(), "Python profiling complete");
        Ok(report_path)
    }

    fn describe(&self) -> String {
        "python".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn has_python() -> bool {
        tokio::process::Command::new("python3")
            .arg("--version")
            .output()
            .await
            .is_ok()
    }

    #[tokio::test]
    async fn produces_cumulative_report() {
        if !has_python().await {
            return;
        }

        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("main.py");
        tokio::fs::write(&source, "print(sum(range(100)))")
            .await
            .unwrap();

        let artifact = PythonProfiler::new().profile(&source, None).await.unwrap();
        assert_eq!(artifact.file_name().unwrap(), REPORT_FILE);

        let report = tokio::fs::read_to_string(&artifact).await.unwrap();
        assert!(report.contains("cumulative"));
    }

    #[tokio::test]
    async fn crashing_program_fails_with_traceback() {
        if !has_python().await {
            return;
        }

        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("bad.py");
        tokio::fs::write(&source, "raise RuntimeError('nope')")
            .await
            .unwrap();

        let err = PythonProfiler::new()
            .profile(&source, None)
            .await
            .unwrap_err();
        match err {
            ExecutionError::CommandFailed { phase, stderr, .. } => {
                assert_eq!(phase, "profile");
                assert!(stderr.contains("RuntimeError"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
