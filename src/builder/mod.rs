//! Container layer builder
//!
//! Builds one residual layer by mutating a container started from the
//! parent image: create an idle container, copy files in, execute the
//! layer's commands, then flatten the result into a single-layer image
//! via export + import. Dependency labels are attached on import.
//!
//! Flattening is mandatory, not a fallback: long reuse chains would
//! otherwise hit the runtime's per-image layer-depth limit, and a
//! flattened image collapses the apt-list/pip-cache cleanup into the same
//! layer as the install.

use crate::error::{DepimgError, DepimgResult};
use crate::labels;
use crate::layer::{slugify, Layer, LayerKind};
use crate::runtime::Runtime;
use crate::shell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// In-image staging directory for `file:` script payloads
const SCRIPT_STAGE_DIR: &str = "/dependency_img_build";

/// Builds residual layers on top of a parent image
pub struct LayerBuilder<'a> {
    runtime: &'a dyn Runtime,
    env_vars: BTreeMap<String, String>,
    config_dir: PathBuf,
    work_dir: PathBuf,
    preserve_on_failure: bool,
    /// Name of the most recently created container, for reproduction hints
    pub last_container: Option<String>,
    /// The exact command that failed, for reproduction hints
    pub last_failed_command: Option<String>,
}

impl<'a> LayerBuilder<'a> {
    pub fn new(
        runtime: &'a dyn Runtime,
        env_vars: BTreeMap<String, String>,
        config_dir: PathBuf,
        work_dir: PathBuf,
        preserve_on_failure: bool,
    ) -> Self {
        Self {
            runtime,
            env_vars,
            config_dir,
            work_dir,
            preserve_on_failure,
            last_container: None,
            last_failed_command: None,
        }
    }

    /// Build `layer` on top of `parent_image`, producing `target_tag`.
    ///
    /// `metadata_items` are attached as dependency labels on import; an
    /// empty list imports without labels.
    pub async fn build_layer(
        &mut self,
        layer: &Layer,
        parent_image: &str,
        target_tag: &str,
        metadata_items: &[String],
    ) -> DepimgResult<String> {
        let suffix = Uuid::new_v4().simple().to_string();
        let container = format!("depimg_{}_{}", slugify(&layer.name), &suffix[..8]);
        self.last_container = Some(container.clone());

        let cidfile = self.work_dir.join(format!("{container}.cid"));
        let idle_command: Vec<String> = ["bash", "-lc", "while sleep 3600; do :; done"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        debug!("creating container {container} from {parent_image}");
        self.runtime
            .create_container(&container, parent_image, &self.env_vars, &cidfile, &idle_command)
            .await
            .map_err(|e| step_error(&container, "create", e))?;

        let result = self
            .run_in_container(layer, &container, target_tag, metadata_items)
            .await;

        match &result {
            Ok(_) => {
                let _ = self.runtime.remove_container(&container).await;
            }
            Err(_) => {
                let _ = self.runtime.stop_container(&container).await;
                if !self.preserve_on_failure {
                    let _ = self.runtime.remove_container(&container).await;
                }
            }
        }
        result
    }

    async fn run_in_container(
        &mut self,
        layer: &Layer,
        container: &str,
        target_tag: &str,
        metadata_items: &[String],
    ) -> DepimgResult<String> {
        for mapping in &layer.copies {
            self.apply_copy(container, mapping).await?;
        }

        self.runtime
            .start_container(container)
            .await
            .map_err(|e| step_error(container, "start", e))?;

        let mut commands = self.layer_commands(layer, container).await?;
        if let Some(first) = commands.first_mut() {
            *first = format!("set -e; {first}");
        }
        for command in &commands {
            self.exec(container, command).await?;
        }

        self.runtime
            .stop_container(container)
            .await
            .map_err(|e| step_error(container, "stop", e))?;

        // Flatten: export the filesystem and import it back as a single
        // layer, attaching dependency labels in the same operation.
        let tar = self.work_dir.join(format!("{container}.tar"));
        self.runtime
            .export_container(container, &tar)
            .await
            .map_err(|e| step_error(container, "export", e))?;

        let change = if metadata_items.is_empty() {
            None
        } else {
            Some(labels::change_directive(&labels::encode(metadata_items)))
        };
        self.runtime
            .import_tarball(&tar, target_tag, change.as_deref())
            .await
            .map_err(|e| step_error(container, "import", e))?;

        Ok(target_tag.to_string())
    }

    /// Apply one `src:dst` copy mapping. The destination is pre-created
    /// inside a started container, then the container is stopped for the
    /// actual `cp` so the filesystem is quiescent.
    async fn apply_copy(&mut self, container: &str, mapping: &str) -> DepimgResult<()> {
        let (src, dst) = mapping.split_once(':').ok_or_else(|| DepimgError::Builder {
            container: container.to_string(),
            command: format!("cp {mapping}"),
            reason: "copy mapping must be 'src:dst'".to_string(),
        })?;
        let src_abs = self.config_dir.join(src);
        let src_is_dir = src_abs.is_dir();
        let dst = if dst == "/" {
            dst.to_string()
        } else {
            dst.trim_end_matches('/').to_string()
        };

        self.runtime
            .start_container(container)
            .await
            .map_err(|e| step_error(container, "start", e))?;
        if src_is_dir {
            self.exec(container, &format!("mkdir -p {}", shell::quote(&dst)))
                .await?;
        } else {
            let parent = Path::new(&dst)
                .parent()
                .and_then(|p| p.to_str())
                .filter(|p| !p.is_empty())
                .unwrap_or("/");
            self.exec(container, &format!("mkdir -p {}", shell::quote(parent)))
                .await?;
        }
        self.runtime
            .stop_container(container)
            .await
            .map_err(|e| step_error(container, "stop", e))?;

        // A directory source copied to a precise dst must land as the dst
        // itself, not as dst/<basename>: copy the directory contents.
        let cp_src = if src_is_dir {
            src_abs.join(".")
        } else {
            src_abs
        };
        self.runtime
            .copy_into(container, &cp_src, &dst)
            .await
            .map_err(|e| step_error(container, "cp", e))?;
        Ok(())
    }

    /// Compute the command sequence for a layer. Script layers with
    /// `file:` directives stage the script into the container here, which
    /// requires stop/copy/start round-trips mid-assembly.
    async fn layer_commands(&mut self, layer: &Layer, container: &str) -> DepimgResult<Vec<String>> {
        let mut commands = Vec::new();
        match layer.kind {
            LayerKind::Apt => {
                let pkg = shell::quote(&layer.content);
                commands.push("export DEBIAN_FRONTEND=noninteractive".to_string());
                commands.push("apt-get update".to_string());
                commands.push(format!("apt-get install -y {pkg}"));
                commands.push("rm -rf /var/lib/apt/lists/* || true".to_string());
            }
            LayerKind::Yum => {
                if layer.name == "yum_makecache" || layer.name == "yum_refresh" {
                    commands.push("yum makecache".to_string());
                } else {
                    commands.push(format!("yum install -y {}", shell::quote(&layer.content)));
                }
            }
            LayerKind::Pip => {
                commands.push(format!(
                    "python3 -m pip install --no-cache-dir {}",
                    shell::quote(&layer.content)
                ));
            }
            LayerKind::Script | LayerKind::Config => {
                let mut runlines = Vec::new();
                for raw in layer.content.lines() {
                    let line = raw.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if let Some(rel) = line.strip_prefix("file:") {
                        runlines.push(self.stage_script_file(container, rel.trim()).await?);
                    } else {
                        runlines.push(line.to_string());
                    }
                }
                if !runlines.is_empty() {
                    commands.push(runlines.join(" && "));
                }
            }
            LayerKind::Base => {}
        }
        Ok(commands)
    }

    /// Copy a `file:` script into the container and return the command
    /// line that runs it (dispatched to python3 or bash by suffix).
    async fn stage_script_file(&mut self, container: &str, rel: &str) -> DepimgResult<String> {
        let base = Path::new(rel)
            .file_name()
            .and_then(|f| f.to_str())
            .ok_or_else(|| DepimgError::Builder {
                container: container.to_string(),
                command: format!("file:{rel}"),
                reason: "script path has no file name".to_string(),
            })?
            .to_string();
        let src_abs = self.config_dir.join(rel);
        let dst = format!("{SCRIPT_STAGE_DIR}/{base}");

        self.exec(
            container,
            &format!("mkdir -p {SCRIPT_STAGE_DIR} && chmod 0777 {SCRIPT_STAGE_DIR}"),
        )
        .await?;
        self.runtime
            .stop_container(container)
            .await
            .map_err(|e| step_error(container, "stop", e))?;
        self.runtime
            .copy_into(container, &src_abs, &dst)
            .await
            .map_err(|e| step_error(container, "cp", e))?;
        self.runtime
            .start_container(container)
            .await
            .map_err(|e| step_error(container, "start", e))?;
        self.exec(container, &format!("chmod +x {}", shell::quote(&dst)))
            .await?;

        let interpreter = if base.ends_with(".py") {
            "python3"
        } else {
            "/bin/bash"
        };
        Ok(format!("{interpreter} {}", shell::quote(&dst)))
    }

    async fn exec(&mut self, container: &str, command: &str) -> DepimgResult<()> {
        println!(">>> [{container}] {command}");
        match self
            .runtime
            .exec_streaming(container, &self.env_vars, command)
            .await
        {
            Ok(0) => Ok(()),
            Ok(code) => {
                self.last_failed_command = Some(command.to_string());
                Err(DepimgError::Builder {
                    container: container.to_string(),
                    command: command.to_string(),
                    reason: format!("exit code {code}"),
                })
            }
            Err(e) => {
                self.last_failed_command = Some(command.to_string());
                Err(e)
            }
        }
    }
}

/// Wrap a runtime error with the container and failed operation, keeping
/// interrupts as-is so they propagate unchanged.
fn step_error(container: &str, operation: &str, error: DepimgError) -> DepimgError {
    match error {
        DepimgError::Interrupted { .. } => error,
        other => DepimgError::Builder {
            container: container.to_string(),
            command: operation.to_string(),
            reason: other.to_string(),
        },
    }
}
