//! Integration tests for `forge-dash render`.

mod common;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE;
use common::{TestEnv, stdout_json};
use predicates::prelude::*;

const SOURCE: &str = "@startuml\nUser -> API: login\n@enduml\n";

#[test]
fn test_render_file() {
    let env = TestEnv::sample();
    let file = env.forge_dir().join("design/auth/diagrams/flow.puml");
    let output = env
        .forge_dash()
        .args(["render", "--plantuml-server", "http://plantuml.test/plantuml"])
        .arg(&file)
        .output()
        .unwrap();
    assert!(output.status.success());

    let json = stdout_json(&output);
    let encoded = URL_SAFE.encode(SOURCE);
    assert_eq!(
        json["svg"],
        format!("http://plantuml.test/plantuml/svg/~1{}", encoded)
    );
    assert_eq!(
        json["png"],
        format!("http://plantuml.test/plantuml/png/~1{}", encoded)
    );
}

#[test]
fn test_render_uses_configured_server() {
    let env = TestEnv::sample();
    env.project_config("plantuml-server \"http://uml.internal\"\n");
    env.forge_dash()
        .args(["render", "-H", ".forge/design/auth/diagrams/flow.puml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("SVG: http://uml.internal/svg/~1"))
        .stdout(predicate::str::contains("PNG: http://uml.internal/png/~1"));
}

#[test]
fn test_render_stdin() {
    let env = TestEnv::new();
    let output = env
        .forge_dash()
        .args(["render", "-"])
        .write_stdin(SOURCE)
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(
        stdout_json(&output)["svg"]
            .as_str()
            .unwrap()
            .starts_with("https://www.plantuml.com/plantuml/svg/~1")
    );
}

#[test]
fn test_render_empty_source() {
    let env = TestEnv::new();
    let file = env.write("empty.puml", "  \n");
    env.forge_dash()
        .arg("render")
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("No PlantUML source provided"));
}

#[test]
fn test_render_missing_file() {
    let env = TestEnv::new();
    env.forge_dash()
        .args(["render", "nope.puml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not found"));
}

#[test]
fn test_render_verify_unreachable_server() {
    let env = TestEnv::new();
    let file = env.write("a.puml", SOURCE);
    env.forge_dash()
        .args(["render", "--verify", "--plantuml-server", "http://127.0.0.1:1"])
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Diagram rendering failed"));
}
