//! CLI-backed container runtime
//!
//! Drives the runtime binary (`docker` by default, any CLI-compatible
//! runtime works) as subprocesses. Inspection calls are captured with a
//! short timeout; build execs inherit the terminal and stream live.
//! When the plain binary cannot reach the daemon but non-interactive sudo
//! can, every command is prefixed with `sudo -n -E`.

use crate::error::{DepimgError, DepimgResult};
use crate::runtime::Runtime;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// Timeout for captured inspection calls (images/inspect/cat)
const INSPECT_TIMEOUT: Duration = Duration::from_secs(8);

/// Container runtime driven through its CLI
#[derive(Debug)]
pub struct CliRuntime {
    program: String,
    use_sudo: bool,
}

impl CliRuntime {
    /// Probe the runtime and decide whether sudo is required.
    ///
    /// Tries `<program> info` directly first; if that fails, retries with
    /// `sudo -n -E`. Fails with `RuntimeUnavailable` when neither works.
    pub async fn detect(program: &str) -> DepimgResult<Self> {
        if probe(program, false).await {
            return Ok(Self {
                program: program.to_string(),
                use_sudo: false,
            });
        }
        if probe(program, true).await {
            info!("runtime '{program}' requires sudo; prefixing commands with sudo -n -E");
            return Ok(Self {
                program: program.to_string(),
                use_sudo: true,
            });
        }
        Err(DepimgError::RuntimeUnavailable {
            runtime: program.to_string(),
        })
    }

    #[cfg(test)]
    pub fn without_detection(program: &str) -> Self {
        Self {
            program: program.to_string(),
            use_sudo: false,
        }
    }

    fn command(&self, args: &[String]) -> (Command, String) {
        let display_str = format!("{} {}", self.program, args.join(" "));
        let mut cmd = if self.use_sudo {
            let mut c = Command::new("sudo");
            c.args(["-n", "-E", &self.program]);
            c
        } else {
            Command::new(&self.program)
        };
        cmd.args(args);
        (cmd, display_str)
    }

    /// Run a command with captured output, failing on non-zero exit
    async fn output(
        &self,
        args: &[String],
        timeout: Option<Duration>,
    ) -> DepimgResult<std::process::Output> {
        let (mut cmd, display_str) = self.command(args);
        debug!("executing: {}", display_str);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output = match timeout {
            Some(limit) => tokio::time::timeout(limit, cmd.output())
                .await
                .map_err(|_| {
                    DepimgError::command_exec(display_str.as_str(), format!("timed out after {limit:?}"))
                })?,
            None => cmd.output().await,
        }
        .map_err(|e| DepimgError::command_failed(display_str.as_str(), e))?;

        if output.status.success() {
            Ok(output)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(DepimgError::command_exec(display_str, stderr))
        }
    }

    /// Run a command with inherited stdio, streaming to the terminal.
    ///
    /// On operator interrupt the child is killed and waited for before
    /// returning `Interrupted`.
    async fn stream(&self, args: &[String]) -> DepimgResult<i32> {
        let (mut cmd, display_str) = self.command(args);
        debug!("streaming: {}", display_str);
        let mut child = cmd
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| DepimgError::command_failed(display_str.as_str(), e))?;

        let outcome = tokio::select! {
            status = child.wait() => Some(status),
            _ = tokio::signal::ctrl_c() => None,
        };
        match outcome {
            Some(status) => {
                let status = status.map_err(|e| DepimgError::command_failed(display_str.as_str(), e))?;
                Ok(status.code().unwrap_or(-1))
            }
            None => {
                let _ = child.kill().await;
                let _ = child.wait().await;
                Err(DepimgError::Interrupted { command: display_str })
            }
        }
    }
}

async fn probe(program: &str, with_sudo: bool) -> bool {
    let mut cmd = if with_sudo {
        let mut c = Command::new("sudo");
        c.args(["-n", "-E", program]);
        c
    } else {
        Command::new(program)
    };
    cmd.arg("info")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    matches!(
        tokio::time::timeout(Duration::from_secs(5), cmd.status()).await,
        Ok(Ok(status)) if status.success()
    )
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

#[async_trait]
impl Runtime for CliRuntime {
    async fn list_images(&self) -> DepimgResult<Vec<String>> {
        let output = self
            .output(
                &args(&["images", "--format", "{{.Repository}}:{{.Tag}}"]),
                Some(INSPECT_TIMEOUT),
            )
            .await?;
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    async fn image_labels(&self, image: &str) -> DepimgResult<HashMap<String, String>> {
        let output = self
            .output(
                &args(&[
                    "image",
                    "inspect",
                    image,
                    "--format",
                    "{{json .Config.Labels}}",
                ]),
                Some(INSPECT_TIMEOUT),
            )
            .await?;
        let raw = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if raw.is_empty() || raw == "null" {
            return Ok(HashMap::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    async fn read_image_file(&self, image: &str, path: &str) -> DepimgResult<String> {
        let output = self
            .output(
                &args(&["run", "--rm", "--entrypoint", "/bin/cat", image, path]),
                Some(INSPECT_TIMEOUT),
            )
            .await?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn create_container(
        &self,
        name: &str,
        image: &str,
        env: &BTreeMap<String, String>,
        cidfile: &Path,
        command: &[String],
    ) -> DepimgResult<String> {
        let mut argv = vec!["create".to_string()];
        for (k, v) in env {
            argv.push("-e".to_string());
            argv.push(format!("{k}={v}"));
        }
        argv.push("--cidfile".to_string());
        argv.push(cidfile.display().to_string());
        argv.push("--name".to_string());
        argv.push(name.to_string());
        argv.push(image.to_string());
        argv.extend(command.iter().cloned());

        let output = self.output(&argv, None).await?;

        // The CID-file survives partial stdout loss; fall back to stdout
        if let Ok(cid) = tokio::fs::read_to_string(cidfile).await {
            let cid = cid.trim();
            if !cid.is_empty() {
                return Ok(cid.to_string());
            }
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn start_container(&self, container: &str) -> DepimgResult<()> {
        self.output(&args(&["start", container]), None).await?;
        Ok(())
    }

    async fn stop_container(&self, container: &str) -> DepimgResult<()> {
        self.output(&args(&["stop", container]), None).await?;
        Ok(())
    }

    async fn remove_container(&self, container: &str) -> DepimgResult<()> {
        match self.output(&args(&["rm", "-f", container]), None).await {
            Ok(_) => Ok(()),
            Err(DepimgError::CommandExecution { stderr, .. })
                if stderr.to_lowercase().contains("no such container") =>
            {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn copy_into(&self, container: &str, src: &Path, dst: &str) -> DepimgResult<()> {
        self.output(
            &args(&[
                "cp",
                &src.display().to_string(),
                &format!("{container}:{dst}"),
            ]),
            None,
        )
        .await?;
        Ok(())
    }

    async fn exec_streaming(
        &self,
        container: &str,
        env: &BTreeMap<String, String>,
        command: &str,
    ) -> DepimgResult<i32> {
        let mut argv = vec!["exec".to_string(), "-i".to_string(), "-t".to_string()];
        for (k, v) in env {
            argv.push("-e".to_string());
            argv.push(format!("{k}={v}"));
        }
        argv.push(container.to_string());
        argv.push("/bin/bash".to_string());
        argv.push("-lc".to_string());
        argv.push(command.to_string());
        self.stream(&argv).await
    }

    async fn export_container(&self, container: &str, tar: &Path) -> DepimgResult<()> {
        let direct = self
            .output(
                &args(&["export", "-o", &tar.display().to_string(), container]),
                None,
            )
            .await;
        if direct.is_ok() {
            return Ok(());
        }

        // Some runtimes lack `-o`; stream stdout into the tar file instead
        debug!("export -o failed, falling back to streaming export");
        let file = std::fs::File::create(tar)
            .map_err(|e| DepimgError::io(format!("creating {}", tar.display()), e))?;
        let (mut cmd, display_str) = self.command(&args(&["export", container]));
        let status = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::from(file))
            .stderr(Stdio::piped())
            .status()
            .await
            .map_err(|e| DepimgError::command_failed(display_str.as_str(), e))?;
        if status.success() {
            Ok(())
        } else {
            Err(DepimgError::command_exec(display_str, "streaming export failed"))
        }
    }

    async fn import_tarball(
        &self,
        tar: &Path,
        tag: &str,
        change: Option<&str>,
    ) -> DepimgResult<()> {
        let mut argv = vec!["import".to_string()];
        if let Some(directive) = change {
            argv.push("--change".to_string());
            argv.push(directive.to_string());
        }
        argv.push(tar.display().to_string());
        argv.push(tag.to_string());
        self.output(&argv, None).await?;
        Ok(())
    }

    async fn tag_image(&self, source: &str, target: &str) -> DepimgResult<()> {
        self.output(&args(&["tag", source, target]), None)
            .await
            .map_err(|e| DepimgError::Tag {
                image_source: source.to_string(),
                target: target.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn remove_image(&self, image: &str) -> DepimgResult<()> {
        self.output(&args(&["rmi", "-f", image]), None)
            .await
            .map_err(|e| DepimgError::ImageRemove {
                image: image.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_assembly_plain() {
        let runtime = CliRuntime::without_detection("docker");
        let (_, display_str) = runtime.command(&args(&["images", "-q"]));
        assert_eq!(display_str, "docker images -q");
    }

    #[test]
    fn command_assembly_sudo() {
        let runtime = CliRuntime {
            program: "docker".to_string(),
            use_sudo: true,
        };
        let (cmd, display_str) = runtime.command(&args(&["info"]));
        assert_eq!(cmd.as_std().get_program(), "sudo");
        // The display_str string stays readable without the sudo prefix
        assert_eq!(display_str, "docker info");
    }

    #[tokio::test]
    async fn detect_fails_for_missing_binary() {
        let err = CliRuntime::detect("definitely-not-a-container-runtime")
            .await
            .unwrap_err();
        assert!(matches!(err, DepimgError::RuntimeUnavailable { .. }));
    }

    #[tokio::test]
    async fn output_maps_spawn_failure() {
        let runtime = CliRuntime::without_detection("definitely-not-a-container-runtime");
        let err = runtime.output(&args(&["info"]), None).await.unwrap_err();
        assert!(matches!(err, DepimgError::CommandFailed { .. }));
    }
}
