//! Init command - write an example declaration file

use crate::cli::args::InitArgs;
use crate::error::{DepimgError, DepimgResult};
use console::style;
use tokio::fs;

const EXAMPLE_DECLARATION: &str = r#"# depimg build declaration
base_image: ubuntu:22.04
image_name: my-app
image_tag: latest

heavy_setup:
  apt_packages:
    - curl
    - git
    - python3
    - python3-pip
  pip_packages:
    - requests
  script_installs:
    - name: bootstrap
      commands:
        - echo 'Setting up environment'
        - python3 -m pip install --upgrade pip

light_setup:
  shell:
    - name: motd
      commands:
        - echo 'built by depimg' > /etc/motd

# Custom APT sources, written before the first apt-get update:
# apt_sources:
#   - deb http://archive.ubuntu.com/ubuntu jammy main universe

# Environment inheritance (proxy and timezone are on by default):
# inherit_locale: true
# inherit_custom_env: ["BUILD_*"]
# exclude_env: ["http_proxy"]
"#;

/// Execute the init command
pub async fn execute(args: InitArgs) -> DepimgResult<()> {
    fs::write(&args.output, EXAMPLE_DECLARATION)
        .await
        .map_err(|e| DepimgError::io(format!("writing {}", args.output.display()), e))?;
    println!(
        "{} example declaration created: {}",
        style("[OK]").green(),
        args.output.display()
    );
    Ok(())
}
