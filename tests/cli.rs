use assert_cmd::prelude::*;
use predicates::str::contains;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

const PARTS: [&str; 6] = ["Backgrounds", "Lights", "Windows", "Objects", "Frame", "Floor"];

fn write_product(root: &Path, parts: &[&str]) {
    let mut obj = String::from("v 0 0 0\nv 1 0 0\nv 0 1 0\n");
    for name in parts {
        obj.push_str(&format!("o {name}\nf 1 2 3\n"));
    }
    fs::create_dir_all(root.join("models")).expect("models dir");
    fs::write(root.join("models/cube.obj"), obj).expect("write model");
}

fn showcase(root: &Path) -> Command {
    let mut cmd = Command::cargo_bin("cube-showcase").expect("binary exists");
    cmd.arg(root).args(["--asset", "models/cube.obj", "--headless"]);
    cmd
}

#[test]
fn headless_run_reports_parts_and_passes() {
    let dir = TempDir::new().expect("temp dir");
    write_product(dir.path(), &PARTS);

    showcase(dir.path())
        .args(["--frames", "3", "--width", "640", "--height", "360"])
        .args(["--set", "exposure=0.5"])
        .assert()
        .success()
        .stdout(contains(
            "Loaded models/cube.obj with parts: frame, windows, background, lights, objects, floor",
        ))
        .stdout(contains("Rendered 3 frame(s) at 640x360"))
        .stdout(contains("passes scene -> bloom"))
        .stdout(contains("6 draw call(s) (1 blended)"))
        .stdout(contains("exposure 0.0625"));
}

#[test]
fn floor_texture_makes_the_floor_blend() {
    let dir = TempDir::new().expect("temp dir");
    write_product(dir.path(), &PARTS);
    fs::create_dir_all(dir.path().join("textures")).expect("textures dir");
    image::RgbaImage::from_pixel(2, 2, image::Rgba([0, 0, 0, 128]))
        .save(dir.path().join("textures/FloorShadow.png"))
        .expect("write texture");

    showcase(dir.path())
        .assert()
        .success()
        .stdout(contains("6 draw call(s) (2 blended)"));
}

#[test]
fn missing_part_keeps_the_session_running() {
    let dir = TempDir::new().expect("temp dir");
    write_product(dir.path(), &PARTS[..5]);

    showcase(dir.path())
        .assert()
        .success()
        .stdout(contains("No product attached"))
        .stdout(contains("0 draw call(s)"));
}

#[test]
fn json_mode_prints_one_record_per_frame() {
    let dir = TempDir::new().expect("temp dir");
    write_product(dir.path(), &PARTS);

    let output = showcase(dir.path())
        .args(["--frames", "2", "--json"])
        .output()
        .expect("run binary");
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).expect("utf8 output");
    let records: Vec<serde_json::Value> = stdout
        .lines()
        .filter(|line| line.starts_with('{'))
        .map(|line| serde_json::from_str(line).expect("frame record"))
        .collect();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1]["index"], 1);
    assert_eq!(records[0]["passes"], serde_json::json!(["scene", "bloom"]));
    assert_eq!(records[0]["draw_calls"], 6);
    assert_eq!(records[0]["frame_color"], "#121212");
}

#[test]
fn config_file_sets_asset_and_parameters() {
    let dir = TempDir::new().expect("temp dir");
    write_product(dir.path(), &PARTS);
    let config = dir.path().join("showcase.xml");
    fs::write(
        &config,
        r#"<showcase>
    <asset>models/cube.obj</asset>
    <parameter key="frameColor">#ff0000</parameter>
</showcase>"#,
    )
    .expect("write config");

    let output = Command::cargo_bin("cube-showcase")
        .expect("binary exists")
        .arg(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["--headless", "--json"])
        .output()
        .expect("run binary");
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("utf8 output");
    assert!(stdout.contains(r##""frame_color":"#ff0000""##));
}

#[test]
fn unknown_parameter_is_rejected() {
    let dir = TempDir::new().expect("temp dir");
    write_product(dir.path(), &PARTS);

    showcase(dir.path())
        .args(["--set", "sparkle=1"])
        .assert()
        .failure()
        .stderr(contains("sparkle"));
}

#[test]
fn print_panel_lists_the_folders() {
    Command::cargo_bin("cube-showcase")
        .expect("binary exists")
        .arg("--print-panel")
        .assert()
        .success()
        .stdout(contains("\"Post Processing\""))
        .stdout(contains("\"bloomStrength\""));
}
