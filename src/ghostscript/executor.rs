//! Compression executor
//!
//! Builds and runs the Ghostscript invocation against a staged input as an
//! isolated child process, enforces the configured timeout, and classifies
//! the result. Diagnostics (exit code, bounded stderr prefix) go to
//! operator logs only; callers see a classified outcome.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::ghostscript::Profile;
use crate::staging::StagedFile;

/// How much of the engine's stderr is retained for logs
const MAX_STDERR_PREFIX: usize = 2048;

/// Result of one engine invocation
#[derive(Debug)]
pub enum CompressionOutcome {
    /// Output file exists and is non-empty
    Success {
        original_size: u64,
        compressed_size: u64,
    },
    /// Engine binary not found or not executable
    Unavailable { detail: String },
    /// Non-zero exit, or a clean exit that produced no usable output
    Failure {
        exit_code: Option<i32>,
        stderr_prefix: String,
    },
    /// The invocation exceeded the configured timeout and was terminated
    TimedOut { limit: Duration },
}

/// Runs Ghostscript against staged files
pub struct Executor {
    command: String,
    timeout: Duration,
}

impl Executor {
    pub fn new(command: String, timeout: Duration) -> Self {
        Self { command, timeout }
    }

    /// Invoke the engine for one request.
    ///
    /// The child runs with no shared state with the caller; stdin is
    /// closed, stdout/stderr are captured. `kill_on_drop` terminates the
    /// child if this future is dropped (timeout or client disconnect).
    pub async fn run(
        &self,
        input: &StagedFile,
        profile: Profile,
        keep_images: bool,
        output: &StagedFile,
    ) -> CompressionOutcome {
        let args = build_args(profile, keep_images, input.path(), output.path());

        let mut command = Command::new(&self.command);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let result = match tokio::time::timeout(self.timeout, command.output()).await {
            Err(_) => {
                tracing::warn!(
                    command = %self.command,
                    timeout_secs = self.timeout.as_secs(),
                    input = %input.path().display(),
                    "Ghostscript invocation exceeded timeout and was terminated"
                );
                return CompressionOutcome::TimedOut {
                    limit: self.timeout,
                };
            }
            Ok(Err(error)) => return self.classify_spawn_error(error),
            Ok(Ok(result)) => result,
        };

        if !result.status.success() {
            let stderr_prefix = bounded_prefix(&result.stderr);
            tracing::error!(
                command = %self.command,
                exit_code = ?result.status.code(),
                stderr = %stderr_prefix,
                "Ghostscript exited with a failure status"
            );
            return CompressionOutcome::Failure {
                exit_code: result.status.code(),
                stderr_prefix,
            };
        }

        let compressed_size = match tokio::fs::metadata(output.path()).await {
            Ok(meta) if meta.len() > 0 => meta.len(),
            _ => {
                tracing::error!(
                    command = %self.command,
                    output = %output.path().display(),
                    "Ghostscript exited cleanly but produced no output"
                );
                return CompressionOutcome::Failure {
                    exit_code: result.status.code(),
                    stderr_prefix: bounded_prefix(&result.stderr),
                };
            }
        };
        let original_size = tokio::fs::metadata(input.path())
            .await
            .map(|meta| meta.len())
            .unwrap_or(0);

        CompressionOutcome::Success {
            original_size,
            compressed_size,
        }
    }

    fn classify_spawn_error(&self, error: std::io::Error) -> CompressionOutcome {
        match error.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                tracing::error!(
                    command = %self.command,
                    error = %error,
                    "Ghostscript executable is not available"
                );
                CompressionOutcome::Unavailable {
                    detail: error.to_string(),
                }
            }
            _ => {
                tracing::error!(
                    command = %self.command,
                    error = %error,
                    "Failed to launch Ghostscript"
                );
                CompressionOutcome::Failure {
                    exit_code: None,
                    stderr_prefix: error.to_string(),
                }
            }
        }
    }
}

/// Construct the engine argument list: a fixed-version pdfwrite run with
/// the resolved preset, and downsampling disabled when the caller asked
/// to keep embedded images.
fn build_args(profile: Profile, keep_images: bool, input: &Path, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-sDEVICE=pdfwrite".into(),
        "-dCompatibilityLevel=1.4".into(),
        format!("-dPDFSETTINGS={}", profile.preset()).into(),
        "-dNOPAUSE".into(),
        "-dQUIET".into(),
        "-dBATCH".into(),
    ];

    let mut output_flag = OsString::from("-sOutputFile=");
    output_flag.push(output.as_os_str());
    args.push(output_flag);

    if keep_images {
        args.push("-dDownsampleColorImages=false".into());
        args.push("-dDownsampleGrayImages=false".into());
        args.push("-dDownsampleMonoImages=false".into());
    }

    args.push(input.as_os_str().to_os_string());
    args
}

fn bounded_prefix(stderr: &[u8]) -> String {
    let end = stderr.len().min(MAX_STDERR_PREFIX);
    String::from_utf8_lossy(&stderr[..end]).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staging::ArtifactStore;
    use tempfile::TempDir;

    async fn staged_pair(dir: &TempDir) -> (ArtifactStore, StagedFile, StagedFile) {
        let store = ArtifactStore::new(dir.path().join("in"), dir.path().join("out")).unwrap();
        let input = store.stage(b"%PDF-1.4\nstub").await.unwrap();
        let output = store.reserve_output();
        (store, input, output)
    }

    #[test]
    fn test_build_args_fixed_invocation() {
        let args = build_args(
            Profile::Medium,
            false,
            Path::new("/tmp/in.pdf"),
            Path::new("/tmp/out.pdf"),
        );

        let rendered: Vec<String> = args
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            rendered,
            vec![
                "-sDEVICE=pdfwrite",
                "-dCompatibilityLevel=1.4",
                "-dPDFSETTINGS=/ebook",
                "-dNOPAUSE",
                "-dQUIET",
                "-dBATCH",
                "-sOutputFile=/tmp/out.pdf",
                "/tmp/in.pdf",
            ]
        );
    }

    #[test]
    fn test_build_args_keep_images_disables_downsampling() {
        let args = build_args(
            Profile::High,
            true,
            Path::new("/tmp/in.pdf"),
            Path::new("/tmp/out.pdf"),
        );

        let rendered: Vec<String> = args
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        assert!(rendered.contains(&"-dPDFSETTINGS=/printer".to_string()));
        assert!(rendered.contains(&"-dDownsampleColorImages=false".to_string()));
        assert!(rendered.contains(&"-dDownsampleGrayImages=false".to_string()));
        assert!(rendered.contains(&"-dDownsampleMonoImages=false".to_string()));
        // The input path stays last
        assert_eq!(rendered.last().unwrap(), "/tmp/in.pdf");
    }

    #[test]
    fn test_bounded_prefix_truncates() {
        let long = vec![b'x'; MAX_STDERR_PREFIX * 2];
        assert_eq!(bounded_prefix(&long).len(), MAX_STDERR_PREFIX);
        assert_eq!(bounded_prefix(b"  short  "), "short");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_missing_binary_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let (_store, input, output) = staged_pair(&dir).await;

        let executor = Executor::new(
            "/nonexistent/dir/gs-missing".to_string(),
            Duration::from_secs(5),
        );
        let outcome = executor.run(&input, Profile::Medium, false, &output).await;

        assert!(matches!(outcome, CompressionOutcome::Unavailable { .. }));
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_nonzero_exit_is_failure() {
        let dir = TempDir::new().unwrap();
        let (_store, input, output) = staged_pair(&dir).await;

        let executor = Executor::new("false".to_string(), Duration::from_secs(5));
        let outcome = executor.run(&input, Profile::Medium, false, &output).await;

        match outcome {
            CompressionOutcome::Failure { exit_code, .. } => assert_eq!(exit_code, Some(1)),
            other => panic!("expected Failure, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_clean_exit_without_output_is_failure() {
        let dir = TempDir::new().unwrap();
        let (_store, input, output) = staged_pair(&dir).await;

        // `true` exits 0 without writing the reserved output path
        let executor = Executor::new("true".to_string(), Duration::from_secs(5));
        let outcome = executor.run(&input, Profile::Medium, false, &output).await;

        assert!(matches!(outcome, CompressionOutcome::Failure { .. }));
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_timeout_is_terminated() {
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let (_store, input, output) = staged_pair(&dir).await;

        // A stand-in engine that ignores its arguments and hangs
        let script = dir.path().join("hang.sh");
        let mut file = std::fs::File::create(&script).unwrap();
        file.write_all(b"#!/bin/sh\nsleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let executor = Executor::new(
            script.to_str().unwrap().to_string(),
            Duration::from_millis(100),
        );
        let started = std::time::Instant::now();
        let outcome = executor.run(&input, Profile::Medium, false, &output).await;

        assert!(matches!(outcome, CompressionOutcome::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
