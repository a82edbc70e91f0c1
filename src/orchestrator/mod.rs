//! Build orchestrator
//!
//! Drives the pipeline: checksum short-circuit, decomposition, reuse
//! planning against the local image inventory, residual layer builds,
//! dependency metadata embedding, and final tagging. Either the final
//! tags and the sidecar checksum are both written, or neither is.

use crate::builder::LayerBuilder;
use crate::checksum;
use crate::declaration::Declaration;
use crate::envinherit::EnvInheritance;
use crate::error::{DepimgError, DepimgResult};
use crate::inventory;
use crate::layer::decompose::decompose;
use crate::layer::{slugify, split_base_image, Layer, LayerKind};
use crate::planner::{self, ReusePlan};
use crate::runtime::Runtime;
use console::style;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::warn;

/// Build behavior knobs
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Ignore the checksum sidecar and any reusable base
    pub force_rebuild: bool,
    /// Keep the failed container and work directory for diagnostics
    pub preserve_on_failure: bool,
    /// Directory holding the checksum sidecar (the invocation cwd)
    pub sidecar_dir: PathBuf,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            force_rebuild: false,
            preserve_on_failure: true,
            sidecar_dir: PathBuf::from("."),
        }
    }
}

/// Result of a successful build invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Dependency checksum matched; nothing to do
    UpToDate,
    Built {
        image: String,
        built: usize,
        reused: usize,
    },
}

/// Naming scheme derived from the declaration
struct Naming {
    repo_name: String,
    base_tag_slug: String,
    target_ref: String,
    classic_ref: String,
}

impl Naming {
    fn derive(declaration: &Declaration) -> Self {
        let (base_repo, base_tag) = split_base_image(&declaration.base_image);
        let base_repo_slug = slugify(&base_repo);
        let base_tag_slug = slugify(&base_tag);
        let repo_name = format!("{base_repo_slug}__{}", declaration.image_name);
        let target_ref = format!(
            "{repo_name}:{base_tag_slug}__{}",
            declaration.image_tag
        );
        let classic_ref = format!("{}:{}", declaration.image_name, declaration.image_tag);
        Self {
            repo_name,
            base_tag_slug,
            target_ref,
            classic_ref,
        }
    }
}

pub struct Orchestrator<'a> {
    runtime: &'a dyn Runtime,
    /// Directory of the declaration file; `file:` paths and copies are
    /// resolved against it
    config_dir: PathBuf,
    options: BuildOptions,
}

impl<'a> Orchestrator<'a> {
    pub fn new(runtime: &'a dyn Runtime, config_dir: PathBuf, options: BuildOptions) -> Self {
        Self {
            runtime,
            config_dir,
            options,
        }
    }

    /// Run one build to completion.
    pub async fn build(&self, declaration: &Declaration) -> DepimgResult<BuildOutcome> {
        let canonical = checksum::canonical_items(declaration);
        let current = checksum::dependency_checksum(&canonical);
        let sidecar = checksum::sidecar_path(
            &self.options.sidecar_dir,
            &declaration.image_name,
            &declaration.image_tag,
        );

        if !self.options.force_rebuild {
            if let Some(previous) = checksum::read_sidecar(&sidecar).await {
                if previous == current {
                    println!(
                        "{} dependency checksum unchanged, skipping build",
                        style("[OK]").green()
                    );
                    return Ok(BuildOutcome::UpToDate);
                }
            }
        }

        let layers = decompose(declaration);
        let naming = Naming::derive(declaration);

        let plan = if self.options.force_rebuild {
            println!(
                "{} force rebuild requested, ignoring reusable bases",
                style("[INFO]").cyan()
            );
            ReusePlan {
                base_image: declaration.base_image.clone(),
                reused_base: None,
                reused_names: HashSet::new(),
                layers_to_build: layers
                    .iter()
                    .filter(|l| l.kind != LayerKind::Base)
                    .cloned()
                    .collect(),
                extra_scripts: Vec::new(),
            }
        } else {
            let tag_prefix = format!("{}__", naming.base_tag_slug);
            let references = inventory::enumerate(
                self.runtime,
                Some(naming.repo_name.as_str()),
                Some(tag_prefix.as_str()),
            )
            .await;
            let candidates = inventory::inspect_all(self.runtime, references).await;
            let apt_sources_layer = layers.iter().find(|l| l.name == "apt_sources");
            planner::plan(
                &declaration.base_image,
                &layers,
                &candidates,
                apt_sources_layer,
            )
        };
        self.print_plan(&plan);

        let env_vars = EnvInheritance::from_declaration(declaration).extract();
        let work_dir = tempfile::Builder::new()
            .prefix("depimg_build_")
            .tempdir()
            .map_err(|e| DepimgError::io("creating work directory", e))?;

        let mut builder = LayerBuilder::new(
            self.runtime,
            env_vars,
            self.config_dir.clone(),
            work_dir.path().to_path_buf(),
            self.options.preserve_on_failure,
        );

        match self
            .execute(declaration, &layers, &plan, &naming, &mut builder)
            .await
        {
            Ok((built, reused)) => {
                checksum::write_sidecar(&sidecar, &current).await?;
                println!(
                    "{} built {} ({} layers built, {} reused)",
                    style("[OK]").green(),
                    naming.target_ref,
                    built,
                    reused
                );
                Ok(BuildOutcome::Built {
                    image: naming.target_ref,
                    built,
                    reused,
                })
            }
            Err(e) => {
                if let Some(reused_base) = &plan.reused_base {
                    println!(
                        "{} build failed, removing reused base {reused_base} so the next run replans",
                        style("[FAIL]").red()
                    );
                    if let Err(rm_err) = self.runtime.remove_image(reused_base).await {
                        warn!("failed to remove reused base {reused_base}: {rm_err}");
                    }
                }
                self.print_reproduction_hints(&builder);
                if self.options.preserve_on_failure {
                    let kept = work_dir.keep();
                    println!(
                        "  {} work directory preserved: {}",
                        style("[INFO]").cyan(),
                        kept.display()
                    );
                }
                Err(e)
            }
        }
    }

    /// Build residual layers, embed metadata, and apply the final tags.
    /// Returns (built, reused) layer counts.
    async fn execute(
        &self,
        declaration: &Declaration,
        layers: &[Layer],
        plan: &ReusePlan,
        naming: &Naming,
        builder: &mut LayerBuilder<'_>,
    ) -> DepimgResult<(usize, usize)> {
        let mut parent = plan.base_image.clone();
        let mut satisfied: HashSet<String> = plan.reused_names.clone();
        let mut built = 0;

        let total = plan.layers_to_build.len();
        for (index, layer) in plan.layers_to_build.iter().enumerate() {
            println!(
                "{} layer {}/{}: {}:{}",
                style("[BUILD]").bold(),
                index + 1,
                total,
                layer.kind,
                layer.name
            );
            satisfied.insert(layer.name.clone());
            let items = self.dependency_items(declaration, layers, &satisfied);
            let target_tag = layer.image_tag(&naming.repo_name, &naming.base_tag_slug);
            parent = builder
                .build_layer(layer, &parent, &target_tag, &items)
                .await?;
            built += 1;
        }

        // One label-only layer (command `:`) embeds the complete set. A
        // bare base item means nothing dependency-bearing was built or
        // reused, so the parent is tagged directly.
        let final_items = self.dependency_items(declaration, layers, &satisfied);
        let final_image = if final_items.len() <= 1 {
            parent
        } else {
            let digest = hex::encode(Sha256::digest(final_items.join("\n").as_bytes()));
            let meta_tag = format!(
                "{}:{}__meta-{}",
                naming.repo_name,
                naming.base_tag_slug,
                &digest[..12]
            );
            let meta_layer = Layer::new(
                format!("meta_{}", &digest[..12]),
                LayerKind::Script,
                ":",
            );
            builder
                .build_layer(&meta_layer, &parent, &meta_tag, &final_items)
                .await?
        };

        if final_image != naming.target_ref {
            self.runtime
                .tag_image(&final_image, &naming.target_ref)
                .await?;
        }
        if naming.classic_ref != naming.target_ref {
            self.runtime
                .tag_image(&naming.target_ref, &naming.classic_ref)
                .await?;
        }

        Ok((built, plan.reused_names.len()))
    }

    /// Dependency items covered so far: the declared base plus every
    /// satisfied (built or reused) layer's item. Maintenance, cleanup and
    /// config layers contribute nothing.
    fn dependency_items(
        &self,
        declaration: &Declaration,
        layers: &[Layer],
        satisfied: &HashSet<String>,
    ) -> Vec<String> {
        let mut items = vec![format!("base:{}", declaration.base_image)];
        for layer in layers {
            if satisfied.contains(&layer.name) {
                if let Some(item) = layer.dep_item() {
                    items.push(item);
                }
            }
        }
        items.sort_unstable();
        items.dedup();
        items
    }

    fn print_plan(&self, plan: &ReusePlan) {
        println!(
            "{} base image: {}",
            style("[PLAN]").bold(),
            plan.base_image
        );
        if !plan.reused_names.is_empty() {
            let mut reused: Vec<&str> = plan.reused_names.iter().map(String::as_str).collect();
            reused.sort_unstable();
            println!("  reusing: {}", reused.join(", "));
        }
        if !plan.layers_to_build.is_empty() {
            let build_list: Vec<String> = plan
                .layers_to_build
                .iter()
                .map(|l| format!("{}:{}", l.kind, l.name))
                .collect();
            println!("  building: {}", build_list.join(", "));
        }
        for script in &plan.extra_scripts {
            println!(
                "  {} base carries extra script '{script}' (kept; scripts are not reversible)",
                style("[WARN]").yellow()
            );
        }
    }

    /// Manual reproduction steps for a failed layer build
    fn print_reproduction_hints(&self, builder: &LayerBuilder<'_>) {
        let Some(container) = &builder.last_container else {
            return;
        };
        println!("{} reproduce manually:", style("[HINT]").yellow());
        println!("  1) start container: docker start {container}");
        println!("  2) open a shell:    docker exec -it {container} /bin/bash");
        if let Some(command) = &builder.last_failed_command {
            println!(
                "  3) re-run failed:   docker exec -it {container} /bin/bash -lc {}",
                crate::shell::quote(command)
            );
        }
        println!("  4) commit for inspection: docker commit {container} debug/{container}");
        println!(
            "  5) read labels: docker image inspect debug/{container} --format '{{{{json .Config.Labels}}}}'"
        );
    }
}
