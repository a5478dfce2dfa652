use super::{types::ToolDiag, DocumentConverter};
use crate::config::Config;
use crate::error::ConvertError;
use std::cell::OnceCell;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const MAX_REASON_CHARS: usize = 2000;
/// How long pipe output may trail the converter's exit before its helpers are killed.
const PIPE_GRACE: Duration = Duration::from_secs(2);

/// Runs an external converter such as `abiword` or `soffice` as a subprocess.
pub struct CommandConverter {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    resolved: OnceCell<Result<PathBuf, String>>,
}

impl CommandConverter {
    pub fn new(cfg: &Config) -> Self {
        Self::from_parts(
            &cfg.document.program,
            cfg.document.args.clone(),
            Duration::from_secs(cfg.document.timeout_seconds.max(1)),
        )
    }

    pub fn from_parts(program: &str, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.to_string(),
            args,
            timeout,
            resolved: OnceCell::new(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Looks the executable up on PATH the first time only; a miss is remembered so
    /// later documents fail fast with the same reason.
    fn resolve(&self) -> Result<&Path, ConvertError> {
        let resolved = self.resolved.get_or_init(|| match which::which(&self.program) {
            Ok(path) => {
                debug!("document converter resolved: {}", path.display());
                Ok(path)
            }
            Err(err) => {
                let msg = format!("`{}` not found on PATH ({err})", self.program);
                warn!("{msg}; document files will not be converted");
                Err(msg)
            }
        });
        match resolved {
            Ok(path) => Ok(path.as_path()),
            Err(msg) => Err(ConvertError::ExternalTool(msg.clone())),
        }
    }

    fn arg_template(&self) -> Result<Vec<String>, ConvertError> {
        if !self.args.is_empty() {
            return Ok(self.args.clone());
        }
        preset_args(&self.program).ok_or_else(|| {
            ConvertError::ExternalTool(format!(
                "no argument preset for `{}`; set document.args",
                self.program
            ))
        })
    }
}

impl DocumentConverter for CommandConverter {
    fn diagnose(&self) -> ToolDiag {
        let exe = match self.resolve() {
            Ok(p) => p.to_path_buf(),
            Err(err) => {
                return ToolDiag {
                    program: self.program.clone(),
                    resolved_path: None,
                    version: None,
                    ok: false,
                    error: Some(err.to_string()),
                };
            }
        };

        let mut cmd = Command::new(&exe);
        cmd.arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let version = own_process_group(&mut cmd)
            .spawn()
            .map_err(|e| ConvertError::ExternalTool(e.to_string()))
            .and_then(|child| wait_with_timeout(child, Duration::from_secs(10)))
            .ok()
            .and_then(|out| {
                String::from_utf8_lossy(&out.stdout)
                    .lines()
                    .map(str::trim)
                    .find(|l| !l.is_empty())
                    .map(str::to_string)
            });

        ToolDiag {
            program: self.program.clone(),
            resolved_path: Some(exe.display().to_string()),
            version,
            ok: true,
            error: None,
        }
    }

    fn convert_document(&self, input: &Path, output_dir: &Path) -> Result<PathBuf, ConvertError> {
        let exe = self.resolve()?;
        let template = self.arg_template()?;

        // The child runs inside the output directory, so both paths must be absolute.
        let input = input
            .canonicalize()
            .map_err(|e| ConvertError::read(input, e))?;
        let outdir = output_dir.canonicalize().map_err(|e| {
            ConvertError::Setup(format!("output dir {}: {e}", output_dir.display()))
        })?;
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| ConvertError::Render(format!("no file stem: {}", input.display())))?;
        let expected = outdir.join(format!("{stem}.pdf"));

        // A leftover from an earlier run must not pass for fresh output.
        if expected.exists() {
            std::fs::remove_file(&expected).map_err(|e| {
                ConvertError::ExternalTool(format!("removing stale {}: {e}", expected.display()))
            })?;
        }

        let args: Vec<String> = template
            .iter()
            .map(|a| substitute(a, &input, &expected, &outdir, &stem))
            .collect();
        debug!(
            "document converter run {} {:?} timeout={:?}",
            exe.display(),
            args,
            self.timeout
        );

        let mut cmd = Command::new(exe);
        cmd.args(&args)
            .current_dir(&outdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let child = own_process_group(&mut cmd)
            .spawn()
            .map_err(|e| ConvertError::ExternalTool(format!("spawning {}: {e}", self.program)))?;

        let output = wait_with_timeout(child, self.timeout)?;

        if !output.status.success() {
            return Err(ConvertError::ExternalTool(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                failure_reason(&output)
            )));
        }

        if !output.stderr.is_empty() {
            debug!(
                "document converter stderr: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        if !expected.is_file() {
            return Err(ConvertError::ExternalTool(format!(
                "{} produced no {}: {}",
                self.program,
                expected.display(),
                failure_reason(&output)
            )));
        }

        Ok(expected)
    }
}

pub fn preset_args(program: &str) -> Option<Vec<String>> {
    let name = Path::new(program)
        .file_stem()
        .map(|s| s.to_string_lossy().to_ascii_lowercase())?;
    let args: &[&str] = match name.as_str() {
        "abiword" => &["--to=pdf", "--to-name={output}", "{input}"],
        "soffice" | "libreoffice" | "lowriter" => &[
            "--headless",
            "--convert-to",
            "pdf",
            "--outdir",
            "{outdir}",
            "{input}",
        ],
        _ => return None,
    };
    Some(args.iter().map(|s| s.to_string()).collect())
}

fn substitute(template: &str, input: &Path, output: &Path, outdir: &Path, stem: &str) -> String {
    template
        .replace("{input}", &input.display().to_string())
        .replace("{output}", &output.display().to_string())
        .replace("{outdir}", &outdir.display().to_string())
        .replace("{stem}", stem)
}

fn failure_reason(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let text = if stderr.trim().is_empty() {
        stdout.trim()
    } else {
        stderr.trim()
    };
    if text.is_empty() {
        return "no output".to_string();
    }
    // Keep the tail; converters print the actual error last.
    let count = text.chars().count();
    if count <= MAX_REASON_CHARS {
        text.to_string()
    } else {
        let tail: String = text.chars().skip(count - MAX_REASON_CHARS).collect();
        format!("...{tail}")
    }
}

/// Starts the converter as the leader of a new process group, so a timeout can
/// take down the helpers it forks (`soffice` re-execs into `soffice.bin`).
fn own_process_group(cmd: &mut Command) -> &mut Command {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    cmd
}

/// Kills the child and its process group unless it was reaped, so an early return
/// or unwind never leaves a converter running.
struct ChildGuard {
    child: Child,
    reaped: bool,
}

impl ChildGuard {
    fn kill_group(&self) {
        #[cfg(unix)]
        {
            let pgid = self.child.id() as libc::pid_t;
            // ESRCH just means every member is already gone.
            unsafe {
                libc::kill(-pgid, libc::SIGKILL);
            }
        }
    }

    fn kill(&mut self) {
        self.kill_group();
        let _ = self.child.kill();
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if !self.reaped {
            self.kill();
            let _ = self.child.wait();
        }
    }
}

fn wait_with_timeout(child: Child, timeout: Duration) -> Result<Output, ConvertError> {
    let mut guard = ChildGuard {
        child,
        reaped: false,
    };

    // Drain pipes while waiting so a chatty converter can't block on a full buffer.
    let stdout_rx = spawn_reader(guard.child.stdout.take());
    let stderr_rx = spawn_reader(guard.child.stderr.take());

    let start = Instant::now();
    let (status, timed_out) = loop {
        let polled = guard
            .child
            .try_wait()
            .map_err(|e| ConvertError::ExternalTool(format!("try_wait: {e}")))?;
        if let Some(status) = polled {
            guard.reaped = true;
            break (status, false);
        }

        if start.elapsed() > timeout {
            warn!("document converter timed out after {:?}", timeout);
            guard.kill();
            let status = guard
                .child
                .wait()
                .map_err(|e| ConvertError::ExternalTool(format!("wait after kill: {e}")))?;
            guard.reaped = true;
            break (status, true);
        }

        std::thread::sleep(Duration::from_millis(50));
    };

    // Helpers that outlive the converter keep the pipes open; never wait on them
    // past the grace period.
    let deadline = Instant::now() + PIPE_GRACE;
    let stdout = stdout_rx.recv_timeout(deadline.saturating_duration_since(Instant::now()));
    let stderr = stderr_rx.recv_timeout(deadline.saturating_duration_since(Instant::now()));
    if stdout.is_err() || stderr.is_err() {
        debug!("document converter left processes holding its output; killing its group");
        guard.kill_group();
    }
    let output = Output {
        status,
        stdout: stdout.unwrap_or_default(),
        stderr: stderr.unwrap_or_default(),
    };

    if timed_out {
        return Err(ConvertError::ExternalTool(format!(
            "timed out after {}s: {}",
            timeout.as_secs(),
            failure_reason(&output)
        )));
    }
    Ok(output)
}

/// Reads `source` to EOF on a detached thread. The buffer arrives on the returned
/// channel; dropping the receiver abandons it.
fn spawn_reader<R: Read + Send + 'static>(source: Option<R>) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut src) = source {
            let _ = src.read_to_end(&mut buf);
        }
        let _ = tx.send(buf);
    });
    rx
}
