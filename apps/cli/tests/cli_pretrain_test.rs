//! Integration tests for the `gradlaunch pretrain` command.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A command isolated from the caller's cluster variables and config files.
fn gradlaunch(temp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("gradlaunch").unwrap();
    cmd.current_dir(temp.path()).env("HOME", temp.path()).env("NO_COLOR", "1");
    for var in [
        "WORLD_SIZE",
        "RANK",
        "MASTER_ADDR",
        "MASTER_PORT",
        "NUM_GPUS",
        "BERT_PREP_WORKING_DIR",
    ] {
        cmd.env_remove(var);
    }
    cmd.env("GRADLAUNCH_PYTHON", "echo");
    cmd
}

/// Code directory with the results directory and model config in place.
fn code_dir(temp: &TempDir) -> PathBuf {
    let code = temp.path().join("bert");
    fs::create_dir_all(code.join("results")).unwrap();
    fs::write(code.join("bert_config.json"), "{}").unwrap();
    code
}

/// Positional arguments up to `code_dir`, with a 1024 per-GPU phase-1 batch on 8 GPUs.
fn positionals(precision: &str, code: &Path) -> Vec<String> {
    let data = code.join("data");
    [
        "1024", "6e-3", precision, "8", "0.2843", "7038", "200", "false", "true", "true", "128",
        "12439", "bert_lamb_pretraining", "true", "true", "false", "512", "4e-3", "0.128", "1563",
        "512",
    ]
    .iter()
    .map(ToString::to_string)
    .chain([
        data.join("phase1").display().to_string(),
        data.join("phase2").display().to_string(),
        code.display().to_string(),
    ])
    .collect()
}

#[test]
fn test_pretrain_missing_results_dir() {
    let temp = TempDir::new().unwrap();
    let code = temp.path().join("no-such-code-dir");

    gradlaunch(&temp)
        .arg("pretrain")
        .args(positionals("fp16", &code))
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("no-such-code-dir"))
        .stdout(predicate::str::contains("+ echo").not());
}

#[test]
fn test_pretrain_unknown_precision() {
    let temp = TempDir::new().unwrap();
    let code = code_dir(&temp);

    gradlaunch(&temp)
        .arg("pretrain")
        .args(positionals("fp64", &code))
        .assert()
        .code(2)
        .stdout(predicate::str::contains("fp64"));
}

#[test]
fn test_pretrain_print_plan_has_both_phases() {
    let temp = TempDir::new().unwrap();
    let code = temp.path().join("bert");

    let output = gradlaunch(&temp)
        .arg("pretrain")
        .args(positionals("fp16", &code))
        .arg("--print-plan")
        .output()
        .unwrap();
    assert!(output.status.success());

    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let commands = plan.as_array().unwrap();
    assert_eq!(commands.len(), 2);

    let args = |i: usize| -> Vec<String> {
        let args = commands[i]["args"].as_array().unwrap();
        args.iter().map(|a| a.as_str().unwrap().to_string()).collect()
    };
    let phase1 = args(0);
    let phase2 = args(1);
    assert!(!phase1.contains(&"--phase2".to_string()));
    assert!(phase1.contains(&"--max_seq_length=128".to_string()));
    assert_eq!(phase1.iter().filter(|a| *a == "--fp16").count(), 1);
    assert!(phase2.contains(&"--phase2".to_string()));
    assert!(phase2.contains(&"--resume_from_checkpoint".to_string()));
    assert!(phase2.contains(&"--phase1_end_step=7038".to_string()));
    assert!(phase2.contains(&"--max_seq_length=512".to_string()));
}

#[test]
fn test_pretrain_launch_writes_log_files() {
    let temp = TempDir::new().unwrap();
    let code = code_dir(&temp);

    gradlaunch(&temp)
        .arg("pretrain")
        .args(positionals("fp16", &code))
        .assert()
        .success()
        .stdout(predicate::str::contains("Logs written to"))
        .stdout(predicate::str::contains("--phase2"));

    let logs: Vec<String> = fs::read_dir(code.join("results"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .filter(|name| name.ends_with(".log"))
        .collect();
    assert_eq!(logs.len(), 2, "{logs:?}");
    for phase in ["phase1_fp16_gbs8192", "phase2_fp16_gbs4096"] {
        let tag = format!("pyt_bert_pretraining_{phase}");
        assert!(logs.iter().any(|n| n.contains(&tag)), "{logs:?}");
    }

    let phase2_log = logs.iter().find(|n| n.contains("phase2")).unwrap();
    let content = fs::read_to_string(code.join("results").join(phase2_log)).unwrap();
    assert!(content.contains("--resume_from_checkpoint"));
    assert!(code.join("results").join("checkpoints").is_dir());
}

#[test]
fn test_pretrain_phase1_failure_abort() {
    let temp = TempDir::new().unwrap();
    let code = code_dir(&temp);

    gradlaunch(&temp)
        .env("GRADLAUNCH_PYTHON", "false")
        .arg("pretrain")
        .args(positionals("fp16", &code))
        .args(["--on-phase1-failure", "abort"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("[bert_lamb_pretraining phase1]"))
        .stdout(predicate::str::contains("[bert_lamb_pretraining phase2]").not());
}

#[test]
fn test_pretrain_phase1_failure_continues_by_default() {
    let temp = TempDir::new().unwrap();
    let code = code_dir(&temp);

    gradlaunch(&temp)
        .env("GRADLAUNCH_PYTHON", "false")
        .arg("pretrain")
        .args(positionals("fp16", &code))
        .assert()
        .code(1)
        .stdout(predicate::str::contains("[bert_lamb_pretraining phase2]"));
}

#[test]
fn test_pretrain_dry_run_creates_nothing() {
    let temp = TempDir::new().unwrap();
    let code = code_dir(&temp);

    gradlaunch(&temp)
        .arg("pretrain")
        .args(positionals("fp32", &code))
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("(dry run)"))
        .stdout(predicate::str::contains("--fp16").not());

    assert!(!code.join("results").join("checkpoints").exists());
}

#[test]
fn test_pretrain_invalid_autoscaler_config() {
    let temp = TempDir::new().unwrap();
    let code = code_dir(&temp);
    let cfg = temp.path().join("autoscaler.yaml");
    fs::write(&cfg, "autoscaler:\n  num_gradients_to_accumulate: 0\n").unwrap();

    gradlaunch(&temp)
        .arg("pretrain")
        .args(positionals("fp16", &code))
        .arg("--autoscaler-cfg")
        .arg(&cfg)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("autoscaler.yaml"));
}

#[test]
fn test_pretrain_batch_size_overflow_is_a_configuration_error() {
    let temp = TempDir::new().unwrap();
    let code = code_dir(&temp);
    let mut args = positionals("fp16", &code);
    args[0] = (1_u64 << 62).to_string();

    gradlaunch(&temp)
        .arg("pretrain")
        .args(args)
        .arg("--dry-run")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("overflows"))
        .stdout(predicate::str::contains("(dry run)").not());
}
