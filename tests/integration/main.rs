//! Integration tests for copycache

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    /// Isolated config, cache and build context
    struct Env {
        temp: TempDir,
    }

    impl Env {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            fs::create_dir_all(temp.path().join("context/src")).unwrap();
            fs::write(temp.path().join("context/app.txt"), "app").unwrap();
            fs::write(temp.path().join("context/src/main.rs"), "fn main() {}").unwrap();
            fs::write(
                temp.path().join("config.toml"),
                format!(
                    "[cache]\nstate_dir = {:?}\n",
                    temp.path().join("cache").display().to_string()
                ),
            )
            .unwrap();
            Self { temp }
        }

        fn config(&self) -> PathBuf {
            self.temp.path().join("config.toml")
        }

        fn context(&self) -> PathBuf {
            self.temp.path().join("context")
        }

        fn cache(&self) -> PathBuf {
            self.temp.path().join("cache")
        }

        fn cmd(&self) -> Command {
            let mut cmd = copycache();
            cmd.env("COPYCACHE_CONFIG", self.config());
            cmd
        }

        fn resolve(&self, sources: &[&str]) -> assert_cmd::assert::Assert {
            self.cmd()
                .args(["resolve", "--format", "json", "-C"])
                .arg(self.context())
                .args(sources)
                .assert()
        }
    }

    fn copycache() -> Command {
        cargo_bin_cmd!("copycache")
    }

    fn count_in(cache: &Path, dir: &str) -> usize {
        fs::read_dir(cache.join(dir))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    fn record_count(cache: &Path) -> usize {
        count_in(cache, "records")
    }

    /// Staged path of the first entry of the first source in `resolve` JSON output
    fn staged_path(output: &[u8]) -> PathBuf {
        let resolved: serde_json::Value = serde_json::from_slice(output).unwrap();
        let path = resolved["sources"][0]["copy_info"]["entries"][0]["path"]
            .as_str()
            .unwrap();
        PathBuf::from(path)
    }

    #[test]
    fn help_displays() {
        copycache()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("build-time source cache"));
    }

    #[test]
    fn version_displays() {
        copycache()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("copycache"));
    }

    #[test]
    fn list_empty() {
        let env = Env::new();
        env.cmd()
            .arg("list")
            .assert()
            .success()
            .stderr(predicate::str::contains("No cached copy info"));

        env.cmd()
            .args(["list", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::diff("[]\n"));
    }

    #[test]
    fn resolve_miss_then_hit() {
        let env = Env::new();

        let miss = env
            .resolve(&["app.txt"])
            .success()
            .stdout(predicate::str::contains(r#""resolution": "miss""#))
            .stdout(predicate::str::contains(r#""orig_paths": "app.txt""#));
        let staged = staged_path(&miss.get_output().stdout);

        env.resolve(&["./app.txt"])
            .success()
            .stdout(predicate::str::contains(r#""resolution": "hit""#));

        assert_eq!(record_count(&env.cache()), 1);
        assert!(staged.starts_with(env.cache().join("local")));
        assert_eq!(fs::read_to_string(&staged).unwrap(), "app");
    }

    #[test]
    fn resolve_several_sources_uses_multi_hash() {
        let env = Env::new();

        env.resolve(&["app.txt", "src"])
            .success()
            .stdout(predicate::str::contains(r#""src_hash": "multi:"#))
            .stdout(predicate::str::contains(r#""orig_paths": "app.txt src""#));

        assert_eq!(record_count(&env.cache()), 2);
        assert_eq!(count_in(&env.cache(), "aggregates"), 1);
    }

    #[test]
    fn resolve_no_cache_stores_nothing() {
        let env = Env::new();

        env.cmd()
            .args(["resolve", "--no-cache", "--format", "json", "-C"])
            .arg(env.context())
            .arg("app.txt")
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""resolution": "bypass""#));

        assert_eq!(record_count(&env.cache()), 0);
    }

    #[test]
    fn copy_rejects_url() {
        let env = Env::new();
        env.resolve(&["http://example.com/app.tar"])
            .failure()
            .stderr(predicate::str::contains("Source can't be a URL for COPY"))
            .stderr(predicate::str::contains("Use ADD for remote sources"));
    }

    #[test]
    fn resolve_missing_source_fails() {
        let env = Env::new();
        env.resolve(&["missing.txt"])
            .failure()
            .stderr(predicate::str::contains("missing.txt"));
    }

    #[test]
    fn list_shows_resolved_origins() {
        let env = Env::new();
        env.resolve(&["app.txt"]).success();
        env.resolve(&["src"]).success();

        env.cmd()
            .args(["list", "-q"])
            .assert()
            .success()
            .stdout(predicate::str::diff("app.txt\nsrc\n"));

        env.cmd()
            .args(["list", "--format", "plain", "src"])
            .assert()
            .success()
            .stdout(predicate::str::contains("src\tsrc\tdir:"))
            .stdout(predicate::str::contains("app.txt").not());

        env.cmd()
            .args(["list", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""last_modified": "none""#));
    }

    #[test]
    fn list_table_hides_digests_by_default() {
        let env = Env::new();
        env.resolve(&["app.txt"]).success();

        env.cmd()
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("ORIGIN"))
            .stdout(predicate::str::contains("file:").not());

        env.cmd()
            .args(["list", "--digests"])
            .assert()
            .success()
            .stdout(predicate::str::contains("file:"));
    }

    #[test]
    fn rm_reports_not_found_without_failing() {
        let env = Env::new();
        env.resolve(&["app.txt"]).success();

        env.cmd()
            .args(["rm", "unknown-origin", "./app.txt"])
            .assert()
            .success()
            .stderr(predicate::str::contains("unknown-origin not found in cache"))
            .stderr(predicate::str::contains("Removed app.txt"));

        assert_eq!(record_count(&env.cache()), 0);

        env.cmd()
            .args(["rm", "--format", "json", "app.txt"])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""not_found": "app.txt""#));
    }

    #[test]
    fn clear_requires_confirmation() {
        let env = Env::new();
        let resolved = env.resolve(&["app.txt"]).success();
        let staged = staged_path(&resolved.get_output().stdout);

        env.cmd()
            .arg("clear")
            .assert()
            .success()
            .stderr(predicate::str::contains("Aborted"));
        assert_eq!(record_count(&env.cache()), 1);

        env.cmd()
            .args(["clear", "--yes"])
            .assert()
            .success()
            .stderr(predicate::str::contains("Cleared 1 record(s)"));
        assert_eq!(record_count(&env.cache()), 0);
        assert!(!staged.exists());
    }

    #[test]
    fn corrupt_record_is_skipped_by_list() {
        let env = Env::new();
        env.resolve(&["app.txt"]).success();
        fs::write(env.cache().join("records/garbage"), "{not json").unwrap();

        env.cmd()
            .args(["list", "-q"])
            .assert()
            .success()
            .stdout(predicate::str::diff("app.txt\n"))
            .stderr(predicate::str::contains("Failed to load cache record garbage"));
    }

    #[test]
    fn config_path() {
        let env = Env::new();
        env.cmd()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let env = Env::new();
        env.cmd()
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[cache]"))
            .stdout(predicate::str::contains("capacity = 1024"));
    }

    #[test]
    fn config_init_respects_force() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/config.toml");

        copycache()
            .args(["config", "init", "--config"])
            .arg(&path)
            .assert()
            .success();
        assert!(path.exists());

        copycache()
            .args(["config", "init", "--config"])
            .arg(&path)
            .assert()
            .success()
            .stderr(predicate::str::contains("Use --force to overwrite"));
    }

    #[test]
    fn invalid_config_fails_with_hint() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "[general]\nlog_format = \"xml\"").unwrap();

        copycache()
            .args(["list", "--config"])
            .arg(&path)
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"))
            .stderr(predicate::str::contains("copycache config init --force"));
    }
}
