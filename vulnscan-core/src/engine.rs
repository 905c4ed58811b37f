use std::{path::PathBuf, process::Stdio, time::Duration};

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info};
use vulnscan_config::EngineConfig;

use crate::error::EngineError;

/// Extra time granted on top of the scanner's own `--timeout` before the
/// process is killed.
pub const KILL_GRACE: Duration = Duration::from_secs(30);

const STDERR_TAIL_BYTES: usize = 4 * 1024;

/// Runs a vulnerability scan against one image reference and returns the raw
/// JSON report.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScanEngine: Send + Sync {
    async fn scan(&self, image: &str) -> Result<Value, EngineError>;
}

/// `trivy image` driven as a child process.
#[derive(Debug, Clone)]
pub struct TrivyEngine {
    program: String,
    timeout: Duration,
    scanners: String,
    report_dir: Option<PathBuf>,
    grace: Duration,
}

impl TrivyEngine {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
            scanners: "vuln".to_string(),
            report_dir: None,
            grace: KILL_GRACE,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            program: config.trivy_path.clone(),
            timeout: config.timeout,
            scanners: config.scanners.clone(),
            report_dir: config.report_dir.clone(),
            grace: KILL_GRACE,
        }
    }

    pub fn with_scanners(mut self, scanners: impl Into<String>) -> Self {
        self.scanners = scanners.into();
        self
    }

    pub fn with_report_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.report_dir = Some(dir.into());
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    fn workspace(&self) -> Result<tempfile::TempDir, EngineError> {
        let builder = {
            let mut builder = tempfile::Builder::new();
            builder.prefix("vulnscan-report-");
            builder
        };
        match &self.report_dir {
            Some(dir) => builder.tempdir_in(dir),
            None => builder.tempdir(),
        }
        .map_err(EngineError::Workspace)
    }
}

#[async_trait]
impl ScanEngine for TrivyEngine {
    async fn scan(&self, image: &str) -> Result<Value, EngineError> {
        let workspace = self.workspace()?;
        let report_path = workspace.path().join("result.json");
        let timeout_arg = scanner_duration(self.timeout);

        let mut cmd = Command::new(&self.program);
        cmd.arg("image")
            .arg("--format")
            .arg("json")
            .arg("--output")
            .arg(&report_path)
            .arg("--timeout")
            .arg(&timeout_arg)
            .arg("--scanners")
            .arg(&self.scanners)
            .arg(image)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        info!(image, timeout = %timeout_arg, "running trivy");

        let deadline = self.timeout + self.grace;
        let output = match tokio::time::timeout(deadline, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(EngineError::Spawn {
                    program: self.program.clone(),
                    source,
                });
            }
            Err(_) => return Err(EngineError::TimedOut { after: deadline }),
        };

        if !output.status.success() {
            return Err(EngineError::ExitStatus {
                code: output.status.code(),
                stderr: tail(&output.stderr),
            });
        }

        let bytes = tokio::fs::read(&report_path).await.map_err(|source| {
            EngineError::ReportRead {
                path: report_path.clone(),
                source,
            }
        })?;
        let report: Value = serde_json::from_slice(&bytes)?;
        debug!(image, bytes = bytes.len(), "trivy report read");

        Ok(report)
    }
}

/// Format a duration the way Go's `time.ParseDuration` accepts it, preferring
/// the largest whole unit (`20m` rather than `1200s`).
fn scanner_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs == 0 {
        format!("{}ms", duration.as_millis())
    } else if secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

fn tail(bytes: &[u8]) -> String {
    let start = bytes.len().saturating_sub(STDERR_TAIL_BYTES);
    String::from_utf8_lossy(&bytes[start..]).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scanner_duration_prefers_whole_units() {
        assert_eq!(scanner_duration(Duration::from_secs(20 * 60)), "20m");
        assert_eq!(scanner_duration(Duration::from_secs(7200)), "2h");
        assert_eq!(scanner_duration(Duration::from_secs(90)), "90s");
        assert_eq!(scanner_duration(Duration::from_millis(250)), "250ms");
    }

    #[test]
    fn stderr_tail_is_bounded() {
        let noisy = vec![b'x'; STDERR_TAIL_BYTES * 2];
        assert_eq!(tail(&noisy).len(), STDERR_TAIL_BYTES);
        assert_eq!(tail(b"  fatal: image not found \n"), "fatal: image not found");
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let engine = TrivyEngine::new(
            "/nonexistent/vulnscan-trivy",
            Duration::from_secs(5),
        );
        let err = engine.scan("nginx").await.unwrap_err();
        assert!(matches!(err, EngineError::Spawn { .. }));
        assert!(!err.is_process_failure());
    }

    #[cfg(unix)]
    mod fake_trivy {
        use std::{os::unix::fs::PermissionsExt, path::Path};

        use super::*;

        fn script(dir: &Path, body: &str) -> String {
            let path = dir.join("trivy");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
                .unwrap();
            path.to_string_lossy().into_owned()
        }

        const WRITE_REPORT: &str = r#"
while [ $# -gt 0 ]; do
  if [ "$1" = "--output" ]; then out="$2"; fi
  last="$1"
  shift
done
printf '{"ArtifactName":"%s","Results":[{"Vulnerabilities":[{"PkgName":"libssl","Severity":"CRITICAL"}]}]}' "$last" > "$out"
"#;

        #[tokio::test]
        async fn report_is_read_back() {
            let dir = tempfile::tempdir().unwrap();
            let engine = TrivyEngine::new(
                script(dir.path(), WRITE_REPORT),
                Duration::from_secs(5),
            )
            .with_report_dir(dir.path());

            let report = engine.scan("nginx").await.unwrap();
            assert_eq!(report["ArtifactName"], "nginx");
            assert_eq!(
                report["Results"][0]["Vulnerabilities"][0]["PkgName"],
                "libssl"
            );
        }

        #[tokio::test]
        async fn non_zero_exit_carries_stderr() {
            let dir = tempfile::tempdir().unwrap();
            let engine = TrivyEngine::new(
                script(dir.path(), "echo 'unable to find image' >&2\nexit 3"),
                Duration::from_secs(5),
            );

            let err = engine.scan("missing:image").await.unwrap_err();
            match &err {
                EngineError::ExitStatus { code, stderr } => {
                    assert_eq!(*code, Some(3));
                    assert_eq!(stderr, "unable to find image");
                }
                other => panic!("unexpected error: {other:?}"),
            }
            assert!(err.is_process_failure());
        }

        #[tokio::test]
        async fn hung_scanner_is_killed() {
            let dir = tempfile::tempdir().unwrap();
            let engine = TrivyEngine::new(
                script(dir.path(), "exec sleep 30"),
                Duration::from_millis(200),
            )
            .with_grace(Duration::ZERO);

            let err = engine.scan("nginx").await.unwrap_err();
            assert!(matches!(err, EngineError::TimedOut { .. }));
        }

        #[tokio::test]
        async fn unparsable_report_is_an_error() {
            let dir = tempfile::tempdir().unwrap();
            let body = r#"
while [ $# -gt 0 ]; do
  if [ "$1" = "--output" ]; then out="$2"; fi
  shift
done
echo 'not json' > "$out"
"#;
            let engine = TrivyEngine::new(
                script(dir.path(), body),
                Duration::from_secs(5),
            );

            let err = engine.scan("nginx").await.unwrap_err();
            assert!(matches!(err, EngineError::ReportDecode(_)));
        }
    }
}
