//! Integration tests for stepcache

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;

    pub fn stepcache() -> Command {
        let mut cmd = cargo_bin_cmd!("stepcache");
        for var in [
            "INPUT_RUNNER-NAME",
            "INPUT_CACHE-VERSION-SUFFIX",
            "INPUT_CACHE-DIR",
            "GITHUB_ACTIONS",
            "GITHUB_PATH",
            "GITHUB_OUTPUT",
            "STEPCACHE_CONFIG",
            "STEPCACHE_HELPER",
            "STEPCACHE_STORE_DIR",
            "RUST_LOG",
        ] {
            cmd.env_remove(var);
        }
        cmd
    }

    #[test]
    fn help_displays() {
        stepcache()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Per-step result caching"));
    }

    #[test]
    fn version_displays() {
        stepcache()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("stepcache"));
    }

    #[test]
    fn run_without_inputs_fails_with_hint() {
        let temp = tempfile::TempDir::new().unwrap();
        stepcache()
            .current_dir(temp.path())
            .args(["--no-local", "--config"])
            .arg(temp.path().join("missing.toml"))
            .arg("run")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Missing required input: runner-name"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn cache_clear_requires_yes() {
        let temp = tempfile::TempDir::new().unwrap();
        stepcache()
            .args(["cache", "clear", "--store-dir"])
            .arg(temp.path())
            .assert()
            .failure()
            .stderr(predicate::str::contains("without --yes"));
    }
}

#[cfg(unix)]
mod run_tests {
    use super::cli_tests::stepcache;
    use assert_cmd::Command;
    use predicates::prelude::*;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    /// Helper speaking the get-steps-ids / execute protocol.
    ///
    /// Runner `broken` fails enumeration, runner `failing` fails execution.
    /// Every step it actually builds is appended to `executed.log` next to
    /// the cache directory.
    const HELPER: &str = r#"
runner="$1"
command="$2"
case "$command" in
  get-steps-ids)
    if [ "$runner" = "broken" ]; then
      echo "unknown runner $runner" >&2
      exit 1
    fi
    echo '["tools", "build"]'
    ;;
  execute)
    root="$4"
    if [ "$runner" = "failing" ]; then
      mkdir -p "$root/build"
      exit 3
    fi
    for step in tools build; do
      if [ ! -d "$root/$step" ]; then
        mkdir -p "$root/$step"
        echo "$step output" > "$root/$step/out"
        if [ "$step" = "tools" ]; then
          echo "/opt/tools/bin" > "$root/$step/paths.txt"
        fi
        echo "$step" >> "$root/../executed.log"
      fi
    done
    touch "$root/stray.txt"
    ;;
  *)
    exit 2
    ;;
esac
"#;

    struct Fixture {
        temp: TempDir,
        config: PathBuf,
        github_path: PathBuf,
        github_output: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let script = temp.path().join("helper.sh");
            fs::write(&script, HELPER).unwrap();

            let config = temp.path().join("config.toml");
            fs::write(
                &config,
                format!(
                    "[helper]\nprogram = \"sh\"\nargs = [{:?}]\n\n[cache]\nstore_dir = {:?}\n",
                    script.display().to_string(),
                    temp.path().join("store").display().to_string()
                ),
            )
            .unwrap();

            Self {
                github_path: temp.path().join("github_path"),
                github_output: temp.path().join("github_output"),
                config,
                temp,
            }
        }

        fn path(&self, rel: &str) -> PathBuf {
            self.temp.path().join(rel)
        }

        fn cmd(&self) -> Command {
            let mut cmd = stepcache();
            cmd.current_dir(self.temp.path())
                .env("GITHUB_PATH", &self.github_path)
                .env("GITHUB_OUTPUT", &self.github_output)
                .arg("--no-local")
                .arg("--config")
                .arg(&self.config);
            cmd
        }

        fn run(&self, runner: &str, cache_dir: &str) -> Command {
            let mut cmd = self.cmd();
            cmd.args(["run", "--runner-name", runner, "--cache-version-suffix", "v1"])
                .arg("--cache-dir")
                .arg(self.path(cache_dir));
            cmd
        }
    }

    fn read(path: &Path) -> String {
        fs::read_to_string(path).unwrap_or_default()
    }

    #[test]
    fn first_run_saves_and_second_run_restores() {
        let fx = Fixture::new();

        fx.run("build", "cache1")
            .assert()
            .success()
            .stdout(predicate::str::contains("0 hit, 2 saved"));

        let outputs = read(&fx.github_output);
        assert!(outputs.contains("cache-hits=\n"));
        assert!(outputs.contains("cache-saved=build,tools\n"));
        assert_eq!(read(&fx.github_path), "/opt/tools/bin\n");

        fx.run("build", "cache2")
            .arg("--report")
            .arg(fx.path("report.json"))
            .assert()
            .success()
            .stdout(predicate::str::contains("2 hit, 0 saved"));

        assert_eq!(read(&fx.path("executed.log")), "tools\nbuild\n");
        assert_eq!(read(&fx.path("cache2/build/out")), "build output\n");
        assert!(read(&fx.github_output).contains("cache-hits=build,tools\n"));
        assert_eq!(read(&fx.github_path), "/opt/tools/bin\n/opt/tools/bin\n");

        let report: serde_json::Value =
            serde_json::from_str(&read(&fx.path("report.json"))).unwrap();
        assert_eq!(report["steps"][0]["name"], "build");
        assert_eq!(report["steps"][0]["outcome"], "hit");
        assert_eq!(report["steps"][1]["paths"][0], "/opt/tools/bin");

        fx.cmd()
            .args(["cache", "list", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains("build-v1").and(predicate::str::contains("tools-v1")));
    }

    #[test]
    fn enumeration_failure_is_reported_to_host() {
        let fx = Fixture::new();

        fx.run("broken", "cache")
            .env("GITHUB_ACTIONS", "true")
            .assert()
            .failure()
            .stdout(predicate::str::contains("::error::Failed to enumerate steps"))
            .stderr(predicate::str::contains("unknown runner broken"));

        assert!(!fx.path("store").exists());
    }

    #[test]
    fn execution_failure_saves_nothing() {
        let fx = Fixture::new();

        fx.run("failing", "cache")
            .assert()
            .failure()
            .stderr(predicate::str::contains("exit code: 3"));

        assert!(fx.path("cache/build").is_dir());
        fx.cmd()
            .args(["cache", "list", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[]"));
    }

    #[test]
    fn steps_lists_keys() {
        let fx = Fixture::new();

        fx.cmd()
            .args(["steps", "build", "--cache-version-suffix", "v7", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""key": "tools-v7""#))
            .stdout(predicate::str::contains(r#""key": "build-v7""#));
    }

    #[test]
    fn config_path_reports_explicit_file() {
        let fx = Fixture::new();

        fx.cmd()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }
}
