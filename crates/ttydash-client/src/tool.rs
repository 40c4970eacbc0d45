//! One-shot external tool invocation.

use std::ffi::OsStr;
use std::process::Stdio;

use tokio::process::Command;

/// Why a tool run did not succeed.
#[derive(Debug)]
pub(crate) enum ToolFailure {
    Spawn(std::io::Error),
    Exit { code: Option<i32>, stderr: String },
}

impl std::fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolFailure::Spawn(e) => write!(f, "failed to spawn: {e}"),
            ToolFailure::Exit { code, stderr } => {
                match code {
                    Some(code) => write!(f, "exited with status {code}")?,
                    None => write!(f, "terminated by signal")?,
                }
                if !stderr.is_empty() {
                    write!(f, ": {stderr}")?;
                }
                Ok(())
            }
        }
    }
}

/// Runs `bin` to completion and returns its stdout.
///
/// The child is killed if the returned future is dropped, so callers can
/// bound it with `tokio::time::timeout`.
pub(crate) async fn run<I, S>(bin: &OsStr, args: I) -> Result<String, ToolFailure>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = Command::new(bin)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(ToolFailure::Spawn)?;

    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
    }

    Err(ToolFailure::Exit {
        code: output.status.code(),
        stderr: last_line(&String::from_utf8_lossy(&output.stderr)),
    })
}

/// Tools print banners and progress before the actual error; the last
/// non-empty line is the useful one.
fn last_line(stderr: &str) -> String {
    stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default()
        .to_string()
}
