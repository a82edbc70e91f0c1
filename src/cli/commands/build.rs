//! Build command - run one declaration through the full pipeline

use crate::cli::args::BuildArgs;
use crate::declaration::Declaration;
use crate::error::{DepimgError, DepimgResult};
use crate::orchestrator::{BuildOptions, Orchestrator};
use crate::runtime::CliRuntime;
use console::style;
use std::path::PathBuf;

/// Execute the build command
pub async fn execute(args: BuildArgs, runtime_program: &str) -> DepimgResult<()> {
    let declaration = Declaration::from_path(&args.config).await?;
    println!(
        "{} building {}:{} from {}",
        style("[INFO]").cyan(),
        declaration.image_name,
        declaration.image_tag,
        declaration.base_image
    );

    // Declaration problems fail before the runtime is ever touched
    let runtime = CliRuntime::detect(runtime_program).await?;

    let config_dir = args
        .config
        .canonicalize()
        .map_err(|e| DepimgError::io(format!("resolving {}", args.config.display()), e))?
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    let cwd = std::env::current_dir()
        .map_err(|e| DepimgError::io("getting current directory", e))?;
    let options = BuildOptions {
        force_rebuild: args.force_rebuild,
        preserve_on_failure: !args.clean_on_failure,
        sidecar_dir: cwd,
    };

    let orchestrator = Orchestrator::new(&runtime, config_dir, options);
    orchestrator.build(&declaration).await?;
    Ok(())
}
