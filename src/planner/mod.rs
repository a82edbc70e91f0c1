//! Reuse planner
//!
//! Pure, stateless scoring of candidate base images against the target
//! dependency set. The candidate with the largest usable intersection
//! wins; a candidate that already has everything gets a decisive bonus.
//! The emitted plan lists reused layer names, the residual layers to
//! build (configs always rebuild), cleanup layers for removable extras,
//! and the metadata refresh layers needed when continuing from a reused
//! base.

use crate::inventory::CandidateImage;
use crate::layer::{Layer, LayerKind};
use crate::pm::PackageManager;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, info, warn};

/// Per-item score weights: reuse is worth the most, missing work costs
/// half as much, extras are almost free.
const REUSE_WEIGHT: f64 = 100.0;
const MISSING_WEIGHT: f64 = 50.0;
const EXTRA_WEIGHT: f64 = 0.01;
const COMPLETE_MATCH_BONUS: f64 = 10_000.0;

/// The planner's decision for one build
#[derive(Debug, Clone)]
pub struct ReusePlan {
    /// Image to build on top of (the declared base when nothing is reusable)
    pub base_image: String,
    /// Set when the chosen base is a previously built image; deleted on
    /// build failure so the next attempt replans without it
    pub reused_base: Option<String>,
    /// Names of layers satisfied by the chosen base
    pub reused_names: HashSet<String>,
    /// Residual layers in build order (cleanup first, then refresh, then
    /// missing layers and configs)
    pub layers_to_build: Vec<Layer>,
    /// Script extras present in the chosen base; reported, never removed
    pub extra_scripts: Vec<String>,
}

/// Build the target dependency set from decomposed layers, with a map
/// back to the contributing layer.
fn target_items(layers: &[Layer]) -> (BTreeSet<String>, BTreeMap<String, &Layer>) {
    let mut target = BTreeSet::new();
    let mut by_item = BTreeMap::new();
    for layer in layers {
        if let Some(item) = layer.dep_item() {
            target.insert(item.clone());
            by_item.insert(item, layer);
        }
    }
    (target, by_item)
}

/// Choose the optimal base image and emit the residual build plan.
///
/// `apt_sources_layer` is the decomposed `apt_sources` layer, replayed
/// before `apt_refresh` when continuing APT work on a reused base.
pub fn plan(
    declared_base: &str,
    layers: &[Layer],
    candidates: &[CandidateImage],
    apt_sources_layer: Option<&Layer>,
) -> ReusePlan {
    let (target, by_item) = target_items(layers);
    debug!("planner target set: {} items", target.len());

    let mut best: Option<(&CandidateImage, BTreeSet<String>, BTreeSet<String>)> = None;
    let mut best_score = f64::NEG_INFINITY;

    for candidate in candidates {
        let cached: BTreeSet<String> = candidate.items.iter().cloned().collect();
        if cached.is_empty() {
            continue;
        }

        let intersection: BTreeSet<String> = target.intersection(&cached).cloned().collect();
        let missing_count = target.difference(&cached).count();
        let extra: BTreeSet<String> = cached.difference(&target).cloned().collect();

        let mut score = REUSE_WEIGHT * intersection.len() as f64
            - MISSING_WEIGHT * missing_count as f64
            - EXTRA_WEIGHT * extra.len() as f64;
        if missing_count == 0 {
            score += COMPLETE_MATCH_BONUS;
        }
        debug!(
            "candidate {}: intersection={} missing={} extra={} score={score:.2}",
            candidate.reference,
            intersection.len(),
            missing_count,
            extra.len(),
        );

        if score > best_score {
            best_score = score;
            best = Some((candidate, intersection, extra));
        }
    }

    let (winner, intersection, extra) = match best {
        Some((winner, intersection, extra)) if !intersection.is_empty() => {
            (winner, intersection, extra)
        }
        _ => {
            info!("no reusable base found, building from {declared_base}");
            return ReusePlan {
                base_image: declared_base.to_string(),
                reused_base: None,
                reused_names: HashSet::new(),
                layers_to_build: layers
                    .iter()
                    .filter(|l| l.kind != LayerKind::Base)
                    .cloned()
                    .collect(),
                extra_scripts: Vec::new(),
            };
        }
    };

    info!(
        "reusing base {} ({} of {} target items present)",
        winner.reference,
        intersection.len(),
        target.len()
    );

    let reused_names: HashSet<String> = intersection
        .iter()
        .filter_map(|item| by_item.get(item).map(|l| l.name.clone()))
        .collect();

    // Residual layers in original order: configs always rebuild, package
    // and script layers only when missing from the base. Maintenance
    // layers from decomposition are dropped; the refresh pre-pass below
    // replaces them.
    let residual: Vec<Layer> = layers
        .iter()
        .filter(|l| match l.kind {
            LayerKind::Base => false,
            LayerKind::Config => true,
            _ => {
                if l.is_maintenance() {
                    false
                } else {
                    l.dep_item().is_some_and(|item| !intersection.contains(&item))
                }
            }
        })
        .cloned()
        .collect();

    let (cleanup_layers, extra_scripts) = cleanup_for_extras(&extra);
    for script in &extra_scripts {
        warn!("base image carries extra script '{script}'; scripts are never auto-removed");
    }

    let refresh_layers = refresh_for_residual(&residual, apt_sources_layer);

    let mut layers_to_build = cleanup_layers;
    layers_to_build.extend(refresh_layers);
    layers_to_build.extend(residual);

    ReusePlan {
        base_image: winner.reference.clone(),
        reused_base: (winner.reference != declared_base).then(|| winner.reference.clone()),
        reused_names,
        layers_to_build,
        extra_scripts,
    }
}

/// Partition extras into per-manager cleanup layers and reported scripts.
/// Items with other prefixes (e.g. `base:`) are ignored.
fn cleanup_for_extras(extra: &BTreeSet<String>) -> (Vec<Layer>, Vec<String>) {
    let mut by_manager: BTreeMap<PackageManager, Vec<String>> = BTreeMap::new();
    let mut scripts = Vec::new();

    for item in extra {
        let Some((prefix, identity)) = item.split_once(':') else {
            continue;
        };
        if prefix == "script" {
            scripts.push(identity.to_string());
        } else if let Some(pm) = PackageManager::from_prefix(prefix) {
            by_manager.entry(pm).or_default().push(identity.to_string());
        }
    }

    let layers = by_manager
        .into_iter()
        .map(|(pm, mut packages)| {
            packages.sort_unstable();
            packages.dedup();
            Layer::new(
                format!("{}_cleanup_remove", pm.name()),
                LayerKind::Script,
                pm.remove_cmd(&packages),
            )
        })
        .collect();

    (layers, scripts)
}

/// Metadata refresh layers needed before installing packages on a reused
/// base, with the APT sources write replayed first when declared.
fn refresh_for_residual(residual: &[Layer], apt_sources_layer: Option<&Layer>) -> Vec<Layer> {
    let managers: BTreeSet<PackageManager> = residual
        .iter()
        .filter_map(|l| PackageManager::for_kind(l.kind))
        .filter(|pm| pm.needs_refresh())
        .collect();

    let mut layers = Vec::new();
    for pm in managers {
        if pm == PackageManager::Apt {
            if let Some(sources) = apt_sources_layer {
                layers.push(sources.clone());
            }
        }
        if let Some(cmd) = pm.refresh_cmd() {
            layers.push(Layer::new(pm.refresh_layer_name(), LayerKind::Script, cmd));
        }
    }
    layers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::Declaration;
    use crate::layer::decompose::decompose;

    fn candidate(reference: &str, items: &[&str]) -> CandidateImage {
        CandidateImage {
            reference: reference.to_string(),
            items: items.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn declaration_with_apt(packages: &[&str]) -> Declaration {
        let mut decl = Declaration::default();
        decl.heavy_setup.apt_packages = packages.iter().map(|s| s.to_string()).collect();
        decl
    }

    fn build_names(plan: &ReusePlan) -> Vec<&str> {
        plan.layers_to_build.iter().map(|l| l.name.as_str()).collect()
    }

    #[test]
    fn no_candidates_builds_everything() {
        let layers = decompose(&declaration_with_apt(&["curl", "git"]));
        let plan = plan("ubuntu:22.04", &layers, &[], None);
        assert_eq!(plan.base_image, "ubuntu:22.04");
        assert_eq!(plan.reused_base, None);
        assert!(plan.reused_names.is_empty());
        assert_eq!(build_names(&plan), vec!["apt_update", "curl", "git"]);
    }

    #[test]
    fn empty_intersection_falls_back_to_declared_base() {
        let layers = decompose(&declaration_with_apt(&["curl"]));
        let candidates = vec![candidate("repo:tag", &["apt:vim", "apt:emacs"])];
        let plan = plan("ubuntu:22.04", &layers, &candidates, None);
        assert_eq!(plan.base_image, "ubuntu:22.04");
        assert!(plan.reused_names.is_empty());
    }

    #[test]
    fn additive_change_reuses_and_refreshes() {
        // Prior image has curl; new target adds git
        let layers = decompose(&declaration_with_apt(&["curl", "git"]));
        let candidates = vec![candidate(
            "ubuntu__dev:22.04__meta-abc",
            &["apt:curl", "base:ubuntu:22.04"],
        )];
        let plan = plan("ubuntu:22.04", &layers, &candidates, None);

        assert_eq!(plan.base_image, "ubuntu__dev:22.04__meta-abc");
        assert_eq!(plan.reused_base.as_deref(), Some("ubuntu__dev:22.04__meta-abc"));
        assert!(plan.reused_names.contains("curl"));
        assert_eq!(build_names(&plan), vec!["apt_refresh", "git"]);
    }

    #[test]
    fn subtractive_change_emits_cleanup_first() {
        // Prior image has curl+git+htop; new target wants curl+wget
        let layers = decompose(&declaration_with_apt(&["curl", "wget"]));
        let candidates = vec![candidate(
            "ubuntu__dev:22.04__meta-abc",
            &["apt:curl", "apt:git", "apt:htop", "base:ubuntu:22.04"],
        )];
        let plan = plan("ubuntu:22.04", &layers, &candidates, None);

        assert_eq!(
            build_names(&plan),
            vec!["apt_cleanup_remove", "apt_refresh", "wget"]
        );
        let cleanup = &plan.layers_to_build[0];
        assert_eq!(
            cleanup.content,
            "apt-get purge -y git htop || true && apt-get autoremove -y || true"
        );
        assert!(cleanup.is_maintenance());
    }

    #[test]
    fn complete_match_beats_larger_intersection_with_missing() {
        let layers = decompose(&declaration_with_apt(&["curl", "git"]));
        // "partial" matches more items in absolute terms but misses one
        let candidates = vec![
            candidate(
                "repo:partial",
                &["apt:curl", "apt:vim", "apt:emacs", "apt:htop", "apt:tmux"],
            ),
            candidate("repo:complete", &["apt:curl", "apt:git"]),
        ];
        let plan = plan("ubuntu:22.04", &layers, &candidates, None);
        assert_eq!(plan.base_image, "repo:complete");
        // Nothing left to build: no configs, everything reused
        assert!(plan.layers_to_build.is_empty());
        assert_eq!(plan.reused_names.len(), 2);
    }

    #[test]
    fn config_layers_always_rebuild() {
        let mut decl = declaration_with_apt(&["curl"]);
        decl.light_setup = crate::declaration::LightSetup(vec![(
            "shell".to_string(),
            vec![crate::declaration::LightSetupTask {
                name: "motd".to_string(),
                commands: vec!["echo hi > /etc/motd".to_string()],
                ..Default::default()
            }],
        )]);
        let layers = decompose(&decl);
        let candidates = vec![candidate("repo:full", &["apt:curl"])];
        let plan = plan("ubuntu:22.04", &layers, &candidates, None);

        assert_eq!(build_names(&plan), vec!["motd"]);
        assert!(!plan.reused_names.contains("motd"));
    }

    #[test]
    fn script_identity_reuses_despite_body_change() {
        let mut decl = Declaration::default();
        decl.heavy_setup.script_installs = vec![crate::declaration::ScriptInstall {
            name: "bootstrap".to_string(),
            commands: vec!["echo b".to_string()],
            ..Default::default()
        }];
        let layers = decompose(&decl);
        // The prior image was built when the body was "echo a"
        let candidates = vec![candidate("repo:prior", &["script:bootstrap"])];
        let plan = plan("ubuntu:22.04", &layers, &candidates, None);
        assert!(plan.layers_to_build.is_empty());
        assert!(plan.reused_names.contains("bootstrap"));
    }

    #[test]
    fn script_extras_reported_never_removed() {
        let layers = decompose(&declaration_with_apt(&["curl"]));
        let candidates = vec![candidate(
            "repo:scripted",
            &["apt:curl", "script:old_bootstrap"],
        )];
        let plan = plan("ubuntu:22.04", &layers, &candidates, None);
        assert_eq!(plan.extra_scripts, vec!["old_bootstrap"]);
        assert!(plan.layers_to_build.is_empty());
    }

    #[test]
    fn apt_sources_replayed_before_refresh() {
        let mut decl = declaration_with_apt(&["curl", "git"]);
        decl.apt_sources = vec!["deb http://mirror.example/ubuntu jammy main".to_string()];
        let layers = decompose(&decl);
        let sources = layers.iter().find(|l| l.name == "apt_sources").cloned();
        let candidates = vec![candidate("repo:prior", &["apt:curl"])];
        let plan = plan("ubuntu:22.04", &layers, &candidates, sources.as_ref());
        assert_eq!(build_names(&plan), vec!["apt_sources", "apt_refresh", "git"]);
    }

    #[test]
    fn pip_layers_need_no_refresh() {
        let mut decl = Declaration::default();
        decl.heavy_setup.pip_packages = vec!["requests".to_string(), "flask".to_string()];
        let layers = decompose(&decl);
        let candidates = vec![candidate("repo:prior", &["pip:requests"])];
        let plan = plan("ubuntu:22.04", &layers, &candidates, None);
        assert_eq!(build_names(&plan), vec!["flask"]);
    }

    #[test]
    fn planner_monotonicity_on_growing_target() {
        let candidates = vec![candidate("repo:prior", &["apt:curl", "apt:git"])];
        let mut packages = vec!["curl"];
        let mut last_build = 0;
        let mut last_reused = usize::MAX;
        for extra_pkg in ["git", "htop", "wget"] {
            packages.push(extra_pkg);
            let layers = decompose(&declaration_with_apt(&packages));
            let plan = plan("ubuntu:22.04", &layers, &candidates, None);
            assert!(plan.layers_to_build.len() >= last_build);
            assert!(plan.reused_names.len() <= last_reused);
            last_build = plan.layers_to_build.len();
            last_reused = plan.reused_names.len();
        }
    }

    #[test]
    fn tie_broken_by_inspection_order() {
        let layers = decompose(&declaration_with_apt(&["curl"]));
        let candidates = vec![
            candidate("repo:first", &["apt:curl"]),
            candidate("repo:second", &["apt:curl"]),
        ];
        let plan = plan("ubuntu:22.04", &layers, &candidates, None);
        assert_eq!(plan.base_image, "repo:first");
    }
}
