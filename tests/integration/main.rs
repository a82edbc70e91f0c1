//! Integration tests for depimg

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;

    fn depimg() -> Command {
        cargo_bin_cmd!("depimg")
    }

    #[test]
    fn help_displays() {
        depimg()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains(
                "Incremental container image builder",
            ));
    }

    #[test]
    fn version_displays() {
        depimg()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("depimg"));
    }

    #[test]
    fn build_requires_config_flag() {
        depimg().arg("build").assert().failure();
    }

    #[test]
    fn build_missing_config_fails_before_runtime() {
        depimg()
            .args(["build", "-c", "/nonexistent/build.yaml"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Configuration file not found"));
    }

    #[test]
    fn build_rejects_contradictory_script_install() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("bad.yaml");
        std::fs::write(
            &config,
            r#"
heavy_setup:
  script_installs:
    - name: broken
      file: install.sh
      commands: ["echo x"]
"#,
        )
        .unwrap();

        depimg()
            .args(["build", "-c", config.to_str().unwrap()])
            .assert()
            .failure()
            .stderr(predicate::str::contains("both 'file' and 'commands'"));
    }

    #[test]
    fn build_rejects_unsupported_format() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("bad.toml");
        std::fs::write(&config, "image_name = \"dev\"\n").unwrap();

        depimg()
            .args(["build", "-c", config.to_str().unwrap()])
            .assert()
            .failure()
            .stderr(predicate::str::contains("unsupported config format"));
    }

    #[test]
    fn init_writes_loadable_declaration() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("build-config.yaml");

        depimg()
            .args(["init", "-o", output.to_str().unwrap()])
            .assert()
            .success()
            .stdout(predicate::str::contains("example declaration created"));

        let raw = std::fs::read_to_string(&output).unwrap();
        assert!(raw.contains("base_image: ubuntu:22.04"));
        assert!(raw.contains("heavy_setup:"));
    }

    #[test]
    fn build_against_unavailable_runtime_hints() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("ok.yaml");
        std::fs::write(&config, "image_name: dev\nimage_tag: v1\n").unwrap();

        // A runtime binary that certainly does not exist: the declaration
        // parses, then the preflight fails with a remediation hint.
        depimg()
            .args([
                "--runtime",
                "depimg-test-no-such-runtime",
                "build",
                "-c",
                config.to_str().unwrap(),
            ])
            .assert()
            .failure()
            .stderr(predicate::str::contains("not accessible"));
    }
}
