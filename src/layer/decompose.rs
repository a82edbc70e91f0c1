//! Layer decomposition
//!
//! Converts a validated declaration into the ordered layer list the
//! planner and builder operate on. The rules are deterministic: base
//! first, then the APT sources / metadata refresh pre-pass, then one
//! layer per package or script in declaration order, configs last.

use crate::declaration::Declaration;
use crate::layer::{sanitize_package_name, Layer, LayerKind};
use crate::pm::PackageManager;
use crate::shell;

/// Decompose a declaration into an ordered list of layers.
///
/// The first layer is always the BASE layer. Running this twice on the
/// same declaration yields identical output.
pub fn decompose(declaration: &Declaration) -> Vec<Layer> {
    let mut layers = Vec::new();

    layers.push(Layer::new(
        "base",
        LayerKind::Base,
        declaration.base_image.clone(),
    ));

    if !declaration.apt_sources.is_empty() {
        layers.push(Layer::new(
            "apt_sources",
            LayerKind::Script,
            render_apt_sources(&declaration.apt_sources),
        ));
    }

    let has_apt = !declaration.heavy_setup.apt_packages.is_empty()
        || !declaration.apt_packages.is_empty()
        || !declaration.layers.apt.is_empty();
    let has_yum = !declaration.heavy_setup.yum_packages.is_empty()
        || !declaration.yum_packages.is_empty()
        || !declaration.layers.yum.is_empty();

    if has_apt {
        let apt = PackageManager::Apt;
        if let Some(cmd) = apt.refresh_cmd() {
            layers.push(Layer::new(apt.update_layer_name(), LayerKind::Script, cmd));
        }
    }
    if has_yum {
        let yum = PackageManager::Yum;
        if let Some(cmd) = yum.refresh_cmd() {
            layers.push(Layer::new(yum.update_layer_name(), LayerKind::Script, cmd));
        }
    }

    for package in &declaration.heavy_setup.apt_packages {
        layers.push(package_layer(LayerKind::Apt, package));
    }
    for package in &declaration.heavy_setup.yum_packages {
        layers.push(package_layer(LayerKind::Yum, package));
    }

    for install in &declaration.heavy_setup.script_installs {
        let content = match &install.file {
            Some(file) => format!("file:{file}"),
            None => install.commands.join("\n"),
        };
        let mut layer =
            Layer::new(install.name.clone(), LayerKind::Script, content)
                .with_copies(install.copies.clone());
        layer.dependencies = install.dependencies.clone();
        layers.push(layer);
    }

    for package in &declaration.heavy_setup.pip_packages {
        layers.push(package_layer(LayerKind::Pip, package));
    }

    if !declaration.layers.is_empty() {
        for package in &declaration.layers.apt {
            layers.push(package_layer(LayerKind::Apt, package));
        }
        for package in &declaration.layers.yum {
            layers.push(package_layer(LayerKind::Yum, package));
        }
        for script in &declaration.layers.scripts {
            layers.push(Layer::new(
                script.name.clone(),
                LayerKind::Script,
                script.commands.join("\n"),
            ));
        }
    } else {
        for package in &declaration.apt_packages {
            layers.push(package_layer(LayerKind::Apt, package));
        }
        for package in &declaration.yum_packages {
            layers.push(package_layer(LayerKind::Yum, package));
        }
    }

    for (_, tasks) in &declaration.light_setup.0 {
        for task in tasks {
            let mut layer = Layer::new(
                task.name.clone(),
                LayerKind::Config,
                task.commands.join("\n"),
            );
            layer.dependencies = task.dependencies.clone();
            layers.push(layer);
        }
    }

    layers
}

fn package_layer(kind: LayerKind, package: &str) -> Layer {
    Layer::new(sanitize_package_name(package), kind, package)
}

/// Shell command writing the declared APT sources to /etc/apt/sources.list
fn render_apt_sources(sources: &[String]) -> String {
    let quoted: Vec<String> = sources.iter().map(|s| shell::quote(s)).collect();
    format!(
        "printf '%s\\n' {} > /etc/apt/sources.list && chmod 0644 /etc/apt/sources.list",
        quoted.join(" ")
    )
}
