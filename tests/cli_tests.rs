//! CLI integration tests using assert_cmd.
//!
//! Every test runs against a fresh temporary output directory, so nothing is
//! written outside the test's sandbox.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use std::time::{Duration, Instant};

#[allow(deprecated)]
fn primeval(output_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("primeval").unwrap();
    cmd.env_remove("PRIMEVAL_CONFIG")
        .env("RUST_LOG", "warn")
        .arg("--output-dir")
        .arg(output_dir);
    cmd
}

// --- Help and arg validation ---

#[test]
fn help_shows_all_subcommands() {
    let dir = tempfile::tempdir().unwrap();
    primeval(dir.path()).arg("--help").assert().success().stdout(
        predicate::str::contains("sieve")
            .and(predicate::str::contains("validate"))
            .and(predicate::str::contains("distributed"))
            .and(predicate::str::contains("comprehensive"))
            .and(predicate::str::contains("oeis")),
    );
}

#[test]
fn help_validate_shows_args() {
    let dir = tempfile::tempdir().unwrap();
    primeval(dir.path())
        .args(["validate", "--help"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("--limit")
                .and(predicate::str::contains("--classifier"))
                .and(predicate::str::contains("--checkpoint"))
                .and(predicate::str::contains("--resume"))
                .and(predicate::str::contains("--known-primes")),
        );
}

#[test]
fn sieve_requires_limit() {
    let dir = tempfile::tempdir().unwrap();
    primeval(dir.path())
        .arg("sieve")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--limit"));
}

#[test]
fn unknown_strategy_rejected() {
    let dir = tempfile::tempdir().unwrap();
    primeval(dir.path())
        .args(["sieve", "--limit", "100", "--strategy", "wheel"])
        .assert()
        .failure();
}

#[test]
fn unknown_classifier_rejected() {
    let dir = tempfile::tempdir().unwrap();
    primeval(dir.path())
        .args(["validate", "--limit", "100", "--classifier", "coin-flip"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown classifier"));
}

#[test]
fn unknown_policy_rejected() {
    let dir = tempfile::tempdir().unwrap();
    primeval(dir.path())
        .args(["distributed", "--limit", "100", "--policy", "best-effort"])
        .assert()
        .failure();
}

// --- Small end-to-end runs ---

#[test]
fn sieve_prints_count() {
    let dir = tempfile::tempdir().unwrap();
    primeval(dir.path())
        .args(["sieve", "--limit", "1000", "--strategy", "segmented"])
        .assert()
        .success()
        .stdout(predicate::str::contains("168 primes <= 1000"));
}

#[test]
fn sieve_writes_prime_file() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("primes.txt");
    primeval(dir.path())
        .args(["sieve", "--limit", "30", "--out"])
        .arg(&out)
        .assert()
        .success();
    let text = std::fs::read_to_string(&out).unwrap();
    assert_eq!(text, "2\n3\n5\n7\n11\n13\n17\n19\n23\n29\n");
}

#[test]
fn validate_odd_classifier_reports_summary_and_json() {
    let dir = tempfile::tempdir().unwrap();
    primeval(dir.path())
        .args(["validate", "--limit", "100", "--classifier", "odd", "--checkpoint"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("true positives:      24")
                .and(predicate::str::contains("False negatives:\n  2")),
        );
    assert!(dir.path().join("validation_results_100.json").exists());
    // Completed runs retire their checkpoint.
    assert!(!dir.path().join("checkpoint_100.json").exists());
}

#[test]
fn validate_with_known_primes_file() {
    let dir = tempfile::tempdir().unwrap();
    let known = dir.path().join("known.txt");
    std::fs::write(&known, "2\n3\n5\n7\n").unwrap();
    primeval(dir.path())
        .args(["validate", "--limit", "10", "--classifier", "trial-division", "--known-primes"])
        .arg(&known)
        .assert()
        .success()
        .stdout(predicate::str::contains("accuracy:            1.0000"));
}

#[test]
fn distributed_matches_sequential_output() {
    let dir = tempfile::tempdir().unwrap();
    primeval(dir.path())
        .args(["--threads", "2", "distributed", "--limit", "10000", "--classifier", "odd"])
        .args(["--batch-size", "777", "--policy", "partial-success"])
        .assert()
        .success()
        .stdout(predicate::str::contains("true positives:      1228"));
}

#[test]
fn comprehensive_writes_one_file_per_limit() {
    let dir = tempfile::tempdir().unwrap();
    primeval(dir.path())
        .args(["comprehensive", "--limits", "100,1000", "--classifier", "gmp"])
        .assert()
        .success();
    assert!(dir.path().join("validation_results_100.json").exists());
    assert!(dir.path().join("validation_results_1000.json").exists());
}

#[test]
fn oeis_reference_check_passes() {
    let dir = tempfile::tempdir().unwrap();
    primeval(dir.path())
        .args(["oeis", "--classifier", "miller-rabin"])
        .assert()
        .success()
        .stdout(predicate::str::contains("known primes:        100"));
}

#[test]
fn config_file_overrides_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("primeval.toml");
    std::fs::write(&config, "[validation]\nsample_cap = 3\n").unwrap();
    let output = primeval(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["validate", "--limit", "1000", "--classifier", "odd"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("False positives (first 3 of"));
}

#[test]
fn config_can_opt_into_memoization() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("memo.toml");
    std::fs::write(&config, "[validation]\ncache_capacity = 64\n").unwrap();
    primeval(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["validate", "--limit", "1000", "--classifier", "trial-division"])
        .assert()
        .success()
        .stdout(predicate::str::contains("true positives:      168"));
}

#[test]
fn invalid_config_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("bad.toml");
    std::fs::write(&config, "[validation]\nbatch_size = 0\n").unwrap();
    primeval(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["sieve", "--limit", "10"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("batch_size"));
}

// --- Signals ---

/// SIGINT between batches stops a sequential run with a resumable checkpoint.
#[cfg(unix)]
#[test]
fn sigint_interrupts_and_leaves_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let known = dir.path().join("known.txt");
    std::fs::write(&known, "2\n3\n5\n7\n").unwrap();
    // The limit is far beyond what the test waits for; only the signal ends it.
    let mut child = std::process::Command::new(env!("CARGO_BIN_EXE_primeval"))
        .env_remove("PRIMEVAL_CONFIG")
        .env("RUST_LOG", "warn")
        .arg("--output-dir")
        .arg(dir.path())
        .args(["validate", "--limit", "1000000000000", "--classifier", "odd"])
        .args(["--batch-size", "10000", "--checkpoint", "--known-primes"])
        .arg(&known)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .unwrap();

    let checkpoint = dir.path().join("checkpoint_1000000000000.json");
    let deadline = Instant::now() + Duration::from_secs(30);
    while !checkpoint.exists() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(50));
    }
    std::thread::sleep(Duration::from_millis(200));
    let killed = std::process::Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .unwrap();
    assert!(killed.success());

    let deadline = Instant::now() + Duration::from_secs(30);
    while child.try_wait().unwrap().is_none() {
        if Instant::now() > deadline {
            child.kill().unwrap();
            panic!("validate did not stop after SIGINT");
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    let output = child.wait_with_output().unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("rerun with --resume"), "{}", stderr);
    assert!(checkpoint.exists());
}
