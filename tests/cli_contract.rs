mod common;

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::tempdir;

fn write_manifest(path: &Path, yaml: &str) {
    fs::write(path, yaml).expect("manifest should write");
}

fn run_memetrue(cwd: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_memetrue"))
        .current_dir(cwd)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("memetrue command should run")
}

fn error_envelope(output: &Output) -> Value {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let line = stderr
        .lines()
        .rev()
        .find(|line| line.starts_with('{'))
        .unwrap_or_else(|| panic!("no json envelope in stderr: {stderr}"));
    serde_json::from_str(line).expect("envelope should parse")
}

fn base_only_manifest(dir: &Path) {
    fs::write(dir.join("base.png"), common::solid_png(6, 4, [200, 10, 10, 255]))
        .expect("base image should write");
    write_manifest(
        &dir.join("meme.yaml"),
        r#"
base: base.png
output: { width: 30, height: 20 }
"#,
    );
}

#[test]
fn check_reports_manifest_summary() {
    let dir = tempdir().expect("tempdir should create");
    base_only_manifest(dir.path());

    let output = run_memetrue(dir.path(), &["check", "meme.yaml"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("OK: meme.yaml (30x20"), "{stdout}");
    assert!(stdout.contains("Overlays: 0"), "{stdout}");

    let json = run_memetrue(dir.path(), &["check", "meme.yaml", "--json"]);
    let parsed: Value = serde_json::from_slice(&json.stdout).expect("json should parse");
    assert_eq!(parsed["ok"], Value::Bool(true));
    assert_eq!(parsed["width"], 30);
    assert_eq!(parsed["overlays"], 0);
}

#[test]
fn compose_writes_png_of_requested_size() {
    let dir = tempdir().expect("tempdir should create");
    base_only_manifest(dir.path());

    let output = run_memetrue(dir.path(), &["compose", "meme.yaml", "-o", "out.png"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("Wrote out.png (30x20, sha256="), "{stdout}");

    let image = image::open(dir.path().join("out.png"))
        .expect("output should decode")
        .to_rgba8();
    assert_eq!(image.dimensions(), (30, 20));
    common::assert_near(image.get_pixel(15, 10).0, [200, 10, 10, 255]);
}

#[test]
fn compose_defaults_to_meme_png_and_is_deterministic() {
    let dir = tempdir().expect("tempdir should create");
    base_only_manifest(dir.path());

    assert!(run_memetrue(dir.path(), &["compose", "meme.yaml"]).status.success());
    let first = fs::read(dir.path().join("meme.png")).expect("meme.png should exist");
    assert!(run_memetrue(dir.path(), &["compose", "meme.yaml"]).status.success());
    let second = fs::read(dir.path().join("meme.png")).unwrap();
    assert_eq!(first, second);
}

#[test]
fn compose_can_print_a_data_url() {
    let dir = tempdir().expect("tempdir should create");
    base_only_manifest(dir.path());

    let output = run_memetrue(dir.path(), &["compose", "meme.yaml", "--data-url"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.trim().starts_with("data:image/png;base64,"), "{stdout}");
    assert!(!dir.path().join("meme.png").exists());
}

#[test]
fn invalid_manifest_reports_coded_json_error() {
    let dir = tempdir().expect("tempdir should create");
    write_manifest(
        &dir.path().join("broken.yaml"),
        r#"
base: base.png
output: { width: 30, height: 20 }
stickers: []
"#,
    );

    let output = run_memetrue(dir.path(), &["check", "broken.yaml", "--json"]);
    assert_eq!(output.status.code(), Some(2));
    let envelope = error_envelope(&output);
    assert_eq!(envelope["ok"], Value::Bool(false));
    assert_eq!(envelope["error"]["code"], "INVALID_MANIFEST");
}

#[test]
fn small_font_is_rejected_before_rendering() {
    let dir = tempdir().expect("tempdir should create");
    base_only_manifest(dir.path());
    write_manifest(
        &dir.path().join("tiny.yaml"),
        r#"
base: base.png
output: { width: 30, height: 20 }
overlays:
  - { text: "hi", font_size: 10 }
"#,
    );

    let output = run_memetrue(dir.path(), &["compose", "tiny.yaml", "--json"]);
    assert!(!output.status.success());
    let envelope = error_envelope(&output);
    assert_eq!(envelope["error"]["code"], "INVALID_MANIFEST");
    assert!(!dir.path().join("meme.png").exists());
}

#[test]
fn missing_base_image_is_an_image_load_error() {
    let dir = tempdir().expect("tempdir should create");
    write_manifest(
        &dir.path().join("meme.yaml"),
        r#"
base: nowhere.png
output: { width: 30, height: 20 }
"#,
    );

    let output = run_memetrue(dir.path(), &["compose", "meme.yaml", "--json"]);
    assert_eq!(output.status.code(), Some(1));
    let envelope = error_envelope(&output);
    assert_eq!(envelope["error"]["code"], "IMAGE_LOAD_ERROR");
}

#[test]
fn templates_lists_builtin_catalog() {
    let dir = tempdir().expect("tempdir should create");
    let output = run_memetrue(dir.path(), &["templates", "--dir", "memes"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<_> = stdout.lines().collect();
    assert_eq!(lines.len(), 18);
    assert!(lines[0].starts_with("1\tMeme Template 1\t"), "{}", lines[0]);
    assert!(lines[17].contains("template-18.jpg"), "{}", lines[17]);
    assert!(lines[0].ends_with("(missing)"));
}
