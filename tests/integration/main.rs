//! Integration tests for depcache

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::Path;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    /// depcache with an isolated config, running in `dir`
    fn depcache(dir: &Path) -> Command {
        let mut cmd = cargo_bin_cmd!("depcache");
        cmd.current_dir(dir)
            .env("DEPCACHE_CONFIG", dir.join("no-such-config.toml"))
            .env_remove("DEPCACHE_REMOTE")
            .env_remove("DEPCACHE_TRACE")
            .env("CI", "1");
        cmd
    }

    #[test]
    fn help_displays() {
        let dir = TempDir::new().unwrap();
        depcache(dir.path())
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("content-addressed cache"))
            .stdout(predicate::str::contains("make_package_lock"))
            .stdout(predicate::str::contains("tree_hash"));
    }

    #[test]
    fn version_displays() {
        let dir = TempDir::new().unwrap();
        depcache(dir.path())
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("depcache"));
    }

    #[test]
    fn unknown_verb_exits_one() {
        let dir = TempDir::new().unwrap();
        depcache(dir.path()).arg("frobnicate").assert().code(1);
    }

    #[test]
    fn missing_verb_exits_one() {
        let dir = TempDir::new().unwrap();
        depcache(dir.path()).assert().code(1);
    }

    #[test]
    fn project_must_be_a_directory() {
        let dir = TempDir::new().unwrap();
        depcache(dir.path())
            .args(["status", "--project"])
            .arg(dir.path().join("missing"))
            .assert()
            .code(1)
            .stderr(predicate::str::contains("is not a directory"));
    }

    #[test]
    fn remove_outside_git_fails() {
        let dir = TempDir::new().unwrap();
        depcache(dir.path())
            .arg("remove")
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Not inside a git repository"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn invalid_config_is_reported() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(".depcache.toml"), "[project\nmanifest =").unwrap();
        depcache(dir.path())
            .arg("status")
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn make_package_lock_accepts_current_lock_without_git() {
        let dir = TempDir::new().unwrap();
        let manifest = dir.path().join("package.json");
        std::fs::write(&manifest, "{}").unwrap();
        std::fs::write(dir.path().join("package-lock.json"), "{}").unwrap();
        std::fs::File::options()
            .write(true)
            .open(&manifest)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(60))
            .unwrap();

        depcache(dir.path())
            .arg("make_package_lock")
            .assert()
            .success()
            .stdout(predicate::str::contains("up to date"));
    }

    #[test]
    fn make_package_lock_without_git_or_lock_fails() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();

        depcache(dir.path())
            .arg("make_package_lock")
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Not inside a git repository"));
    }
}
