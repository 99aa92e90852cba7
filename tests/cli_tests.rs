use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Read;
use std::net::TcpListener;
use std::path::Path;
use tempfile::TempDir;

use callguard_core::{BinaryCodec, ClassArtifact, ClassCodec, Instruction, JsonCodec, Method, MethodBody};
use callguard_types::Operation;

fn callguard() -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("callguard").unwrap();
    // Keep the developer's shell out of the policy.
    cmd.arg("--log-level").arg("warn").env_remove("RUST_LOG");
    cmd
}

fn write_launcher_json(dir: &Path) -> std::path::PathBuf {
    let class = ClassArtifact::new("app/Launcher").with_method(Method::new(
        "run",
        "()V",
        MethodBody::new(
            2,
            1,
            vec![
                Instruction::op(0x2a),
                Instruction::call(Operation::ProcessStart.signature()),
                Instruction::op(0xb1),
            ],
        ),
    ));
    let path = dir.join("Launcher.json");
    std::fs::write(&path, JsonCodec.encode(&class).unwrap()).unwrap();
    path
}

#[test]
fn test_check_config_lists_allow_lists() {
    callguard()
        .args(["check-config", "--no-env"])
        .args(["--set", "callguard.network.connect.allow=module app.net"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Policy OK"))
        .stdout(predicate::str::contains("module app.net"))
        .stdout(predicate::str::contains("(denied to everyone)"));
}

#[test]
fn test_check_config_json_output() {
    let output = callguard()
        .args(["--json", "check-config", "--no-env"])
        .args(["--set", "callguard.runtime.exit.allow=module app.a, module app.b"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["valid"], true);
}

#[test]
fn test_check_config_rejects_unknown_key() {
    callguard()
        .args(["check-config", "--no-env"])
        .args(["--set", "callguard.system.foo.allow=module app.x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("is not a valid key"));
}

#[test]
fn test_check_config_rejects_malformed_principal() {
    callguard()
        .args(["check-config", "--no-env"])
        .args(["--set", "callguard.system.exec.allow=app.x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not a valid module name: app.x"));
}

#[test]
fn test_check_config_reads_properties_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("policy.properties");
    std::fs::write(
        &path,
        "# launcher policy\ncallguard.system.exec.allow = module app.launcher\n",
    )
    .unwrap();

    callguard()
        .args(["check-config", "--no-env", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("module app.launcher"));
}

#[test]
fn test_check_config_agent_requires_bootstrap_artifact() {
    callguard()
        .args(["check-config", "--no-env", "--agent"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "No callguard.bootstrap.artifact specified",
        ));
}

#[test]
fn test_assemble_transform_inspect() {
    let temp = TempDir::new().unwrap();
    let json = write_launcher_json(temp.path());
    let artifact = temp.path().join("Launcher.cgc");

    callguard()
        .arg("assemble")
        .arg(&json)
        .assert()
        .success()
        .stdout(predicate::str::contains("Assembled app/Launcher"));
    assert!(artifact.exists());

    let guarded = temp.path().join("guarded.cgc");
    callguard()
        .arg("transform")
        .arg(&artifact)
        .arg("--output")
        .arg(&guarded)
        .assert()
        .success()
        .stdout(predicate::str::contains("1 modified, 0 unchanged, 0 failed"));

    let class = BinaryCodec
        .decode(&std::fs::read(&guarded).unwrap())
        .unwrap();
    let body = class.methods[0].body.as_ref().unwrap();
    assert_eq!(body.max_stack, 3);
    assert_eq!(body.instructions[1], Instruction::ldc_str("ProcessBuilder.start"));

    callguard()
        .arg("inspect")
        .arg(&guarded)
        .assert()
        .success()
        .stdout(predicate::str::contains("guards: ProcessBuilder.start"))
        .stdout(predicate::str::contains("; guard"));

    // A second pass finds the guard already in place.
    callguard()
        .arg("transform")
        .arg(&guarded)
        .assert()
        .success()
        .stdout(predicate::str::contains("0 modified, 1 unchanged, 0 failed"));
}

#[test]
fn test_transform_directory_reports_failures() {
    let temp = TempDir::new().unwrap();
    let classes = temp.path().join("classes");
    std::fs::create_dir_all(classes.join("nested")).unwrap();
    let json = write_launcher_json(temp.path());
    let class = JsonCodec.decode(&std::fs::read(json).unwrap()).unwrap();
    std::fs::write(
        classes.join("nested/Launcher.cgc"),
        BinaryCodec.encode(&class).unwrap(),
    )
    .unwrap();
    std::fs::write(classes.join("Broken.cgc"), b"not an artifact").unwrap();
    let quiet = ClassArtifact::new("app/Quiet").with_method(Method::new(
        "id",
        "(I)I",
        MethodBody::new(1, 1, vec![Instruction::op(0x1a), Instruction::op(0xac)]),
    ));
    std::fs::write(classes.join("Quiet.cgc"), BinaryCodec.encode(&quiet).unwrap()).unwrap();

    let out = temp.path().join("out");
    let output = callguard()
        .args(["--json", "transform"])
        .arg(&classes)
        .arg("--output")
        .arg(&out)
        .output()
        .unwrap();

    assert!(!output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["summary"]["modified"], 1);
    assert_eq!(json["summary"]["unchanged"], 1);
    assert_eq!(json["summary"]["failed"], 1);
    assert!(out.join("nested/Launcher.cgc").exists());
    assert_eq!(
        std::fs::read(out.join("Quiet.cgc")).unwrap(),
        std::fs::read(classes.join("Quiet.cgc")).unwrap()
    );
    assert!(!out.join("Broken.cgc").exists());
}

#[test]
fn test_simulate_exit_allowed_terminates_with_code() {
    callguard()
        .args(["simulate", "--no-env"])
        .args(["--set", "callguard.runtime.exit.allow=module app.x"])
        .args(["--principal", "app.x", "exit", "7"])
        .assert()
        .code(7);
}

#[test]
fn test_simulate_exit_denied() {
    callguard()
        .args(["simulate", "--no-env"])
        .args(["--set", "callguard.runtime.exit.allow=module app.x"])
        .args(["--principal", "app.y", "exit", "7"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains(
            "Runtime.exit not allowed for Module: app.y",
        ));
}

#[test]
fn test_simulate_unnamed_caller_is_denied() {
    callguard()
        .args(["simulate", "--no-env"])
        .args(["--set", "callguard.runtime.exit.allow=module app.x"])
        .args(["exit", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "Runtime.exit not allowed for unknown caller",
        ));
}

#[test]
fn test_simulate_connect() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = std::thread::spawn(move || {
        let (mut socket, _) = listener.accept().unwrap();
        let mut received = String::new();
        socket.read_to_string(&mut received).unwrap();
        received
    });

    callguard()
        .args(["simulate", "--no-env"])
        .args(["--set", "callguard.network.connect.allow=module app.client"])
        .args(["--principal", "app.client", "connect"])
        .arg(addr.to_string())
        .args(["--payload", "hello"])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("connected to {}", addr)));

    assert_eq!(server.join().unwrap(), "hello");
}

#[test]
fn test_simulate_connect_denied_never_connects() {
    callguard()
        .args(["simulate", "--no-env", "--principal", "app.client"])
        .args(["connect", "127.0.0.1:9"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "Socket.connect not allowed for Module: app.client",
        ));
}
