use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::{debug, warn};
use wait_timeout::ChildExt;

pub fn build_mastermind_binary(repo_root: &Path) -> Result<PathBuf> {
    let output = Command::new("cargo")
        .arg("build")
        .arg("-p")
        .arg("mastermind")
        .current_dir(repo_root)
        .output()
        .context("build mastermind binary")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("mastermind build failed: {}", stderr.trim());
    }
    Ok(mastermind_binary_path(repo_root))
}

pub fn mastermind_binary_path(repo_root: &Path) -> PathBuf {
    let binary = format!("mastermind{}", std::env::consts::EXE_SUFFIX);
    repo_root.join("target").join("debug").join(binary)
}

/// Arguments for one `mastermind play` process.
#[derive(Debug, Clone)]
pub struct PlayInvocation<'a> {
    pub binary: &'a Path,
    pub config_path: &'a Path,
    pub model: &'a str,
    pub secret: &'a [u32],
    pub runs: u32,
    pub output: &'a Path,
    pub verbose: bool,
}

pub fn play_command(inv: &PlayInvocation<'_>) -> Command {
    let secret = inv
        .secret
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",");
    let mut command = Command::new(inv.binary);
    command
        .arg("play")
        .arg("--config")
        .arg(inv.config_path)
        .arg("--model")
        .arg(inv.model)
        .arg("--secret")
        .arg(secret)
        .arg("--runs")
        .arg(inv.runs.to_string())
        .arg("--output")
        .arg(inv.output);
    if inv.verbose {
        command.arg("--verbose");
    }
    command
}

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessEnd {
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

/// Run `command` with stdout and stderr appended to `log_path`, killing it at `timeout`.
///
/// Output goes straight to the file, so a chatty child can never block on a full pipe.
pub fn run_logged(mut command: Command, log_path: &Path, timeout: Duration, header: &str) -> Result<ProcessEnd> {
    if let Some(parent) = log_path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create logs dir {}", parent.display()))?;
    }
    let mut log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("open log {}", log_path.display()))?;
    writeln!(log, "== {header} ==").with_context(|| format!("write log {}", log_path.display()))?;
    let stderr_log = log
        .try_clone()
        .with_context(|| format!("clone log {}", log_path.display()))?;

    command
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(stderr_log));

    debug!(program = ?command.get_program(), "spawning play process");
    let mut child = command
        .spawn()
        .with_context(|| format!("spawn {:?}", command.get_program()))?;
    let (status, timed_out) = match child.wait_timeout(timeout).context("wait for play process")? {
        Some(status) => (status, false),
        None => {
            warn!(timeout_secs = timeout.as_secs(), "play process timed out, killing");
            child.kill().context("kill play process")?;
            (child.wait().context("wait play process after kill")?, true)
        }
    };
    Ok(ProcessEnd {
        exit_code: status.code(),
        timed_out,
    })
}

/// The last `max_chars` characters of a log, trimmed. Empty when unreadable.
pub fn log_tail(log_path: &Path, max_chars: usize) -> String {
    let Ok(bytes) = fs::read(log_path) else {
        return String::new();
    };
    let text = String::from_utf8_lossy(&bytes);
    let text = text.trim();
    let skip = text.chars().count().saturating_sub(max_chars);
    text.chars().skip(skip).collect()
}

/// Drop a previous attempt's result log so a retry starts clean.
pub fn remove_stale(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("remove {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_path_is_deterministic() {
        let root = Path::new("/repo/root");
        let path = mastermind_binary_path(root);
        let expected = format!(
            "/repo/root/target/debug/mastermind{}",
            std::env::consts::EXE_SUFFIX
        );
        assert_eq!(path, PathBuf::from(expected));
    }

    #[test]
    fn play_command_passes_shared_secret_and_output() {
        let inv = PlayInvocation {
            binary: Path::new("/bin/mastermind"),
            config_path: Path::new("out/batch_mastermind.toml"),
            model: "openai/gpt-4o",
            secret: &[1, 2, 3, 4],
            runs: 5,
            output: Path::new("out/batch_openai_gpt-4o.jsonl"),
            verbose: false,
        };
        let command = play_command(&inv);
        let args: Vec<String> = command
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "play",
                "--config",
                "out/batch_mastermind.toml",
                "--model",
                "openai/gpt-4o",
                "--secret",
                "1,2,3,4",
                "--runs",
                "5",
                "--output",
                "out/batch_openai_gpt-4o.jsonl",
            ]
        );
    }

    #[test]
    fn log_tail_keeps_the_end() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("x.log");
        fs::write(&path, "first line\nsecond line\n").expect("write");
        assert_eq!(log_tail(&path, 11), "second line");
        assert_eq!(log_tail(&dir.path().join("missing.log"), 10), "");
    }

    #[cfg(unix)]
    #[test]
    fn run_logged_captures_output_and_exit_code() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = dir.path().join("logs/play.log");
        let mut command = Command::new("sh");
        command.args(["-c", "echo out; echo err >&2; exit 4"]);
        let end = run_logged(command, &log, Duration::from_secs(5), "attempt 1").expect("run");
        assert_eq!(
            end,
            ProcessEnd {
                exit_code: Some(4),
                timed_out: false
            }
        );
        let text = fs::read_to_string(&log).expect("log");
        assert!(text.starts_with("== attempt 1 =="));
        assert!(text.contains("out"));
        assert!(text.contains("err"));
    }

    #[cfg(unix)]
    #[test]
    fn run_logged_kills_at_deadline() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = dir.path().join("play.log");
        let mut command = Command::new("sh");
        command.args(["-c", "exec sleep 5"]);
        let end = run_logged(command, &log, Duration::from_millis(100), "attempt 1").expect("run");
        assert!(end.timed_out);
    }
}
