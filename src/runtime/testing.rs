//! Scripted in-memory runtime for unit tests
//!
//! Models just enough of an image store to drive the inventory, builder
//! and orchestrator: imported/tagged images land in the store with their
//! label changes applied, so a second "build" against the same fake sees
//! the first build's metadata.

use crate::error::{DepimgError, DepimgResult};
use crate::runtime::Runtime;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create { name: String, image: String },
    Start(String),
    Stop(String),
    RemoveContainer(String),
    CopyInto { container: String, src: PathBuf, dst: String },
    Exec { container: String, command: String },
    Export(String),
    Import { tag: String, change: Option<String> },
    Tag { source: String, target: String },
    Rmi(String),
}

#[derive(Default)]
pub struct State {
    pub images: Vec<String>,
    pub labels: HashMap<String, HashMap<String, String>>,
    pub legacy_files: HashMap<String, String>,
    pub fail_inspect: HashSet<String>,
    /// Substring -> exit code; first match wins, default 0
    pub exec_results: Vec<(String, i32)>,
    pub fail_create: bool,
    pub calls: Vec<Call>,
}

#[derive(Default)]
pub struct ScriptedRuntime {
    pub state: Mutex<State>,
}

impl ScriptedRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(self, reference: &str, labels: &[(String, String)]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.images.push(reference.to_string());
            state
                .labels
                .insert(reference.to_string(), labels.iter().cloned().collect());
        }
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn exec_commands(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Exec { command, .. } => Some(command),
                _ => None,
            })
            .collect()
    }

    pub fn imported_tags(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Import { tag, .. } => Some(tag),
                _ => None,
            })
            .collect()
    }

    pub fn has_image(&self, reference: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .images
            .iter()
            .any(|i| i == reference)
    }

    pub fn image_label_map(&self, reference: &str) -> HashMap<String, String> {
        self.state
            .lock()
            .unwrap()
            .labels
            .get(reference)
            .cloned()
            .unwrap_or_default()
    }
}

/// Parse a `LABEL k="v" k="v"` change directive back into a map.
/// Values written by `labels::change_directive` never contain spaces.
pub fn labels_from_change(change: &str) -> HashMap<String, String> {
    change
        .strip_prefix("LABEL ")
        .unwrap_or(change)
        .split_whitespace()
        .filter_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            Some((k.to_string(), v.trim_matches('"').to_string()))
        })
        .collect()
}

#[async_trait]
impl Runtime for ScriptedRuntime {
    async fn list_images(&self) -> DepimgResult<Vec<String>> {
        Ok(self.state.lock().unwrap().images.clone())
    }

    async fn image_labels(&self, image: &str) -> DepimgResult<HashMap<String, String>> {
        let state = self.state.lock().unwrap();
        if state.fail_inspect.contains(image) {
            return Err(DepimgError::command_exec("inspect", "daemon error"));
        }
        Ok(state.labels.get(image).cloned().unwrap_or_default())
    }

    async fn read_image_file(&self, image: &str, _path: &str) -> DepimgResult<String> {
        self.state
            .lock()
            .unwrap()
            .legacy_files
            .get(image)
            .cloned()
            .ok_or_else(|| DepimgError::command_exec("run cat", "no such file"))
    }

    async fn create_container(
        &self,
        name: &str,
        image: &str,
        _env: &BTreeMap<String, String>,
        _cidfile: &Path,
        _command: &[String],
    ) -> DepimgResult<String> {
        let mut state = self.state.lock().unwrap();
        if state.fail_create {
            return Err(DepimgError::command_exec("create", "image not found"));
        }
        state.calls.push(Call::Create {
            name: name.to_string(),
            image: image.to_string(),
        });
        Ok(format!("cid_{name}"))
    }

    async fn start_container(&self, container: &str) -> DepimgResult<()> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(Call::Start(container.to_string()));
        Ok(())
    }

    async fn stop_container(&self, container: &str) -> DepimgResult<()> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(Call::Stop(container.to_string()));
        Ok(())
    }

    async fn remove_container(&self, container: &str) -> DepimgResult<()> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(Call::RemoveContainer(container.to_string()));
        Ok(())
    }

    async fn copy_into(&self, container: &str, src: &Path, dst: &str) -> DepimgResult<()> {
        self.state.lock().unwrap().calls.push(Call::CopyInto {
            container: container.to_string(),
            src: src.to_path_buf(),
            dst: dst.to_string(),
        });
        Ok(())
    }

    async fn exec_streaming(
        &self,
        container: &str,
        _env: &BTreeMap<String, String>,
        command: &str,
    ) -> DepimgResult<i32> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Exec {
            container: container.to_string(),
            command: command.to_string(),
        });
        let code = state
            .exec_results
            .iter()
            .find(|(needle, _)| command.contains(needle))
            .map(|(_, code)| *code)
            .unwrap_or(0);
        Ok(code)
    }

    async fn export_container(&self, container: &str, _tar: &Path) -> DepimgResult<()> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(Call::Export(container.to_string()));
        Ok(())
    }

    async fn import_tarball(
        &self,
        _tar: &Path,
        tag: &str,
        change: Option<&str>,
    ) -> DepimgResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Import {
            tag: tag.to_string(),
            change: change.map(String::from),
        });
        if !state.images.iter().any(|i| i == tag) {
            state.images.push(tag.to_string());
        }
        if let Some(directive) = change {
            state
                .labels
                .insert(tag.to_string(), labels_from_change(directive));
        } else {
            state.labels.remove(tag);
        }
        Ok(())
    }

    async fn tag_image(&self, source: &str, target: &str) -> DepimgResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Tag {
            source: source.to_string(),
            target: target.to_string(),
        });
        if !state.images.iter().any(|i| i == target) {
            state.images.push(target.to_string());
        }
        if let Some(labels) = state.labels.get(source).cloned() {
            state.labels.insert(target.to_string(), labels);
        }
        Ok(())
    }

    async fn remove_image(&self, image: &str) -> DepimgResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Rmi(image.to_string()));
        state.images.retain(|i| i != image);
        state.labels.remove(image);
        Ok(())
    }
}
