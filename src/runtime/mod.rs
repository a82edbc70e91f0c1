//! Container runtime abstraction
//!
//! Every operation the builder, inventory and orchestrator need from the
//! container runtime goes through this trait. The only shipped
//! implementation drives the runtime's CLI as subprocesses; tests use
//! scripted fakes.

pub mod docker;
#[cfg(test)]
pub(crate) mod testing;

pub use docker::CliRuntime;

use crate::error::DepimgResult;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Abstract container runtime interface
#[async_trait]
pub trait Runtime: Send + Sync {
    /// List local images as `repo:tag` references
    async fn list_images(&self) -> DepimgResult<Vec<String>>;

    /// Read an image's labels via inspect
    async fn image_labels(&self, image: &str) -> DepimgResult<HashMap<String, String>>;

    /// Read a file from an image by running its entrypoint overridden to
    /// `/bin/cat` (legacy metadata fallback)
    async fn read_image_file(&self, image: &str, path: &str) -> DepimgResult<String>;

    /// Create a container without starting it. The id is captured via a
    /// CID-file. Returns the container id.
    async fn create_container(
        &self,
        name: &str,
        image: &str,
        env: &BTreeMap<String, String>,
        cidfile: &Path,
        command: &[String],
    ) -> DepimgResult<String>;

    async fn start_container(&self, container: &str) -> DepimgResult<()>;

    async fn stop_container(&self, container: &str) -> DepimgResult<()>;

    async fn remove_container(&self, container: &str) -> DepimgResult<()>;

    /// Copy a host path into the container filesystem
    async fn copy_into(&self, container: &str, src: &Path, dst: &str) -> DepimgResult<()>;

    /// Execute a shell command in a started container with an allocated
    /// TTY, streaming output to the operator's terminal. Returns the exit
    /// code.
    async fn exec_streaming(
        &self,
        container: &str,
        env: &BTreeMap<String, String>,
        command: &str,
    ) -> DepimgResult<i32>;

    /// Export the container filesystem to a tar file
    async fn export_container(&self, container: &str, tar: &Path) -> DepimgResult<()>;

    /// Import a tarball as a single-layer image, optionally attaching a
    /// `LABEL ...` change directive
    async fn import_tarball(
        &self,
        tar: &Path,
        tag: &str,
        change: Option<&str>,
    ) -> DepimgResult<()>;

    async fn tag_image(&self, source: &str, target: &str) -> DepimgResult<()>;

    async fn remove_image(&self, image: &str) -> DepimgResult<()>;
}
