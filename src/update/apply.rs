//! In-place replacement of the running executable.
//!
//! A running binary cannot overwrite itself portably, so the replacement is
//! delegated to a short helper script launched as a detached process. The
//! helper waits for this process to hand back its response, terminates it,
//! keeps a `.bak` copy of the current executable, copies the verified
//! candidate over it, relaunches it, and deletes itself.
//!
//! Script text is produced by a [`HelperScriptBuilder`] per OS family and the
//! process is started through a [`Launcher`], so nothing here depends on the
//! OS the crate was compiled for except [`DetachedLauncher`].

use crate::constants::BACKUP_SUFFIX;
use crate::core::{Result, UpdateError};
use crate::update::release::{Platform, is_archive_name};
use crate::utils::fs::{atomic_write, ensure_dir, sibling_with_suffix};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Everything a helper script needs to know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperParams {
    /// Verified binary to install.
    pub candidate: PathBuf,
    /// Executable being replaced.
    pub current_exe: PathBuf,
    /// Process to terminate before replacing.
    pub pid: u32,
    /// Seconds to wait before terminating.
    pub delay_secs: u64,
}

/// A helper script ready to be written and launched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptDescription {
    /// Where the script is written.
    pub script_path: PathBuf,
    /// Script text.
    pub contents: String,
    /// Program that runs the script.
    pub program: String,
    /// Arguments passed to `program`.
    pub args: Vec<String>,
    /// Working directory of the launched process.
    pub working_dir: PathBuf,
}

/// Produces the helper script for one OS family.
pub trait HelperScriptBuilder: Send + Sync {
    /// File extension of the script, without the dot.
    fn extension(&self) -> &'static str;

    /// Script text for `params`. `script_path` is where it will live.
    fn render(&self, script_path: &Path, params: &HelperParams) -> String;

    /// Program and arguments that run the script, optionally elevated.
    fn command(&self, script_path: &Path, elevated: bool) -> (String, Vec<String>);

    /// Whether an unwritable install location can be handled by elevating.
    fn supports_elevation(&self) -> bool;

    /// Whether `name` is a binary this platform can run directly.
    fn accepts_binary(&self, name: &str) -> bool;
}

/// POSIX `sh` helper for Linux and macOS.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnixScriptBuilder;

/// `cmd.exe` batch helper for Windows.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsScriptBuilder;

fn sh_quote(path: &Path) -> String {
    format!("'{}'", path.display().to_string().replace('\'', r"'\''"))
}

fn bat_quote(path: &Path) -> String {
    format!("\"{}\"", path.display().to_string().replace('%', "%%"))
}

impl HelperScriptBuilder for UnixScriptBuilder {
    fn extension(&self) -> &'static str {
        "sh"
    }

    fn render(&self, script_path: &Path, params: &HelperParams) -> String {
        let exe = sh_quote(&params.current_exe);
        let staged = sh_quote(&sibling_with_suffix(&params.current_exe, ".new"));
        let backup = sh_quote(&sibling_with_suffix(&params.current_exe, BACKUP_SUFFIX));
        let candidate = sh_quote(&params.candidate);
        let script = sh_quote(script_path);
        let pid = params.pid;

        [
            "#!/bin/sh".to_string(),
            format!("sleep {}", params.delay_secs),
            format!("kill -TERM {pid} >/dev/null 2>&1"),
            "i=0".to_string(),
            format!(
                "while kill -0 {pid} >/dev/null 2>&1 && [ \"$i\" -lt 10 ]; do sleep 1; i=$((i + 1)); done"
            ),
            format!("kill -KILL {pid} >/dev/null 2>&1 || true"),
            format!("cp -p {exe} {backup} >/dev/null 2>&1 || echo 'backup failed' >&2"),
            format!("cp -f {candidate} {staged} || {{ rm -f {script}; exit 1; }}"),
            format!("chmod +x {staged} >/dev/null 2>&1 || true"),
            format!("mv -f {staged} {exe} || {{ rm -f {staged} {script}; exit 1; }}"),
            format!("nohup {exe} >/dev/null 2>&1 &"),
            format!("rm -f {script}"),
            String::new(),
        ]
        .join("\n")
    }

    fn command(&self, script_path: &Path, _elevated: bool) -> (String, Vec<String>) {
        ("sh".to_string(), vec![script_path.display().to_string()])
    }

    fn supports_elevation(&self) -> bool {
        false
    }

    fn accepts_binary(&self, _name: &str) -> bool {
        true
    }
}

impl HelperScriptBuilder for WindowsScriptBuilder {
    fn extension(&self) -> &'static str {
        "bat"
    }

    fn render(&self, script_path: &Path, params: &HelperParams) -> String {
        let exe = bat_quote(&params.current_exe);
        let backup = bat_quote(&sibling_with_suffix(&params.current_exe, BACKUP_SUFFIX));
        let candidate = bat_quote(&params.candidate);
        let script = bat_quote(script_path);

        [
            "@echo off".to_string(),
            "setlocal".to_string(),
            format!("timeout /t {} /nobreak >nul", params.delay_secs),
            format!("taskkill /PID {} /F >nul 2>&1", params.pid),
            format!("copy /Y {exe} {backup} >nul 2>&1"),
            "set tries=0".to_string(),
            ":replace".to_string(),
            format!("copy /Y {candidate} {exe} >nul 2>&1"),
            "if not errorlevel 1 goto relaunch".to_string(),
            "set /a tries+=1".to_string(),
            "if %tries% geq 10 goto cleanup".to_string(),
            "timeout /t 1 /nobreak >nul".to_string(),
            "goto replace".to_string(),
            ":relaunch".to_string(),
            format!("start \"\" {exe}"),
            ":cleanup".to_string(),
            "endlocal".to_string(),
            format!("del /f /q {script} >nul 2>&1"),
            String::new(),
        ]
        .join("\r\n")
    }

    fn command(&self, script_path: &Path, elevated: bool) -> (String, Vec<String>) {
        let script = script_path.display().to_string();
        if elevated {
            // Single-quoted PowerShell literal: a quote is escaped by doubling it.
            let quoted = script.replace('\'', "''");
            (
                "powershell".to_string(),
                vec![
                    "-NoProfile".to_string(),
                    "-Command".to_string(),
                    format!("Start-Process cmd -ArgumentList '/c \"{quoted}\"' -Verb RunAs"),
                ],
            )
        } else {
            ("cmd".to_string(), vec!["/c".to_string(), script])
        }
    }

    fn supports_elevation(&self) -> bool {
        true
    }

    fn accepts_binary(&self, name: &str) -> bool {
        name.to_ascii_lowercase().ends_with(".exe")
    }
}

/// Starts a helper so that it outlives the current process.
pub trait Launcher: Send + Sync {
    /// Launch the described script fully detached.
    fn launch_detached(&self, description: &ScriptDescription) -> Result<()>;
}

/// Spawns the helper with closed stdio in its own process group.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedLauncher;

impl Launcher for DetachedLauncher {
    fn launch_detached(&self, description: &ScriptDescription) -> Result<()> {
        let program = which::which(&description.program)
            .unwrap_or_else(|_| PathBuf::from(&description.program));

        let mut command = std::process::Command::new(&program);
        command
            .args(&description.args)
            .current_dir(&description.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const DETACHED_PROCESS: u32 = 0x0000_0008;
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
            command.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
        }

        let child = command.spawn().map_err(|e| UpdateError::Other {
            message: format!("Failed to launch update helper {}: {e}", program.display()),
        })?;
        info!("Launched update helper (pid {})", child.id());
        Ok(())
    }
}

/// Result of a successful helper launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// The helper runs elevated and the user will see a permission prompt.
    pub requires_elevation: bool,
    /// Location of the launched script.
    pub script_path: PathBuf,
}

/// Whether the current user can create files in `dir`.
pub fn is_dir_writable(dir: &Path) -> bool {
    tempfile::Builder::new().prefix(".upkeep-write-check").tempfile_in(dir).is_ok()
}

fn is_location_writable(exe: &Path) -> bool {
    let dir_writable = exe.parent().is_some_and(is_dir_writable);
    let file_writable = match std::fs::metadata(exe) {
        Ok(meta) => !meta.permissions().readonly(),
        Err(_) => true,
    };
    dir_writable && file_writable
}

/// Launches helper scripts that swap in a verified binary.
#[derive(Clone)]
pub struct ApplyEngine {
    builder: Arc<dyn HelperScriptBuilder>,
    launcher: Arc<dyn Launcher>,
    delay_secs: u64,
}

impl std::fmt::Debug for ApplyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplyEngine")
            .field("script", &self.builder.extension())
            .field("delay_secs", &self.delay_secs)
            .finish_non_exhaustive()
    }
}

impl ApplyEngine {
    /// Create an engine from explicit parts.
    pub fn new(
        builder: Arc<dyn HelperScriptBuilder>,
        launcher: Arc<dyn Launcher>,
        delay_secs: u64,
    ) -> Self {
        Self {
            builder,
            launcher,
            delay_secs,
        }
    }

    /// Engine with the script builder matching `platform`.
    pub fn for_platform(platform: &Platform, launcher: Arc<dyn Launcher>, delay_secs: u64) -> Self {
        let builder: Arc<dyn HelperScriptBuilder> = if platform.is_windows() {
            Arc::new(WindowsScriptBuilder)
        } else {
            Arc::new(UnixScriptBuilder)
        };
        Self::new(builder, launcher, delay_secs)
    }

    /// Reject candidates that cannot replace an executable directly.
    pub fn check_candidate(&self, candidate: &Path) -> Result<()> {
        let name = candidate
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if is_archive_name(&name) || !self.builder.accepts_binary(&name) {
            return Err(UpdateError::UnsupportedAsset { name });
        }
        if !candidate.is_file() {
            return Err(UpdateError::AssetMissing {
                path: candidate.display().to_string(),
            });
        }
        Ok(())
    }

    /// Describe the helper for `params` without touching the filesystem.
    pub fn describe(&self, work_dir: &Path, params: &HelperParams, elevated: bool) -> ScriptDescription {
        let script_path = work_dir.join(format!(
            "apply_update_{}_{}.{}",
            params.pid,
            uuid::Uuid::new_v4().simple(),
            self.builder.extension()
        ));
        let contents = self.builder.render(&script_path, params);
        let (program, args) = self.builder.command(&script_path, elevated);
        ScriptDescription {
            script_path,
            contents,
            program,
            args,
            working_dir: work_dir.to_path_buf(),
        }
    }

    /// Write and launch the helper that replaces `current_exe` with `candidate`.
    ///
    /// Returns once the helper has been started; the replacement happens after
    /// this process is terminated by it. Fails without launching anything if
    /// the candidate is missing or unsuitable, or if the install location is
    /// not writable and this platform cannot elevate.
    pub fn apply_with_helper(
        &self,
        candidate: &Path,
        work_dir: &Path,
        current_exe: &Path,
        pid: u32,
    ) -> Result<ApplyOutcome> {
        self.check_candidate(candidate)?;

        let elevated = if is_location_writable(current_exe) {
            false
        } else if self.builder.supports_elevation() {
            warn!("{} is not writable; requesting elevation", current_exe.display());
            true
        } else {
            return Err(UpdateError::PermissionDenied {
                operation: "replace the installed executable".to_string(),
                path: current_exe.display().to_string(),
            });
        };

        let params = HelperParams {
            candidate: candidate.to_path_buf(),
            current_exe: current_exe.to_path_buf(),
            pid,
            delay_secs: self.delay_secs,
        };

        ensure_dir(work_dir)?;
        let description = self.describe(work_dir, &params, elevated);
        atomic_write(&description.script_path, description.contents.as_bytes())?;
        set_executable(&description.script_path)?;
        debug!("Wrote update helper to {}", description.script_path.display());

        if let Err(e) = self.launcher.launch_detached(&description) {
            let _ = std::fs::remove_file(&description.script_path);
            return Err(e);
        }

        Ok(ApplyOutcome {
            requires_elevation: elevated,
            script_path: description.script_path,
        })
    }
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}
