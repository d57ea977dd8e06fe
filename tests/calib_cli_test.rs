use std::fs;
use std::path::Path;
use std::process::Command;

use image::{Rgb, RgbImage};
use serde_json::Value;

fn cli() -> Command {
    Command::new(env!("CARGO_BIN_EXE_calib-cli"))
}

fn stdout_json(output: &std::process::Output) -> Value {
    let stdout = String::from_utf8(output.stdout.clone()).expect("stdout utf8");
    serde_json::from_str(&stdout).unwrap_or_else(|err| panic!("invalid JSON ({err}): {stdout}"))
}

fn touch(dir: &Path, name: &str) {
    fs::write(dir.join(name), b"").expect("create artifact");
}

#[test]
fn thermal_command_reports_accepted_estimate() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frame_thermal.png");
    let mut frame = RgbImage::from_pixel(40, 40, Rgb([128, 128, 128]));
    frame.put_pixel(5, 5, Rgb([0, 0, 0]));
    frame.put_pixel(30, 30, Rgb([255, 255, 255]));
    frame.save(&path).unwrap();

    let output = cli()
        .args(["thermal", "--image"])
        .arg(&path)
        .output()
        .expect("thermal command");

    assert_eq!(output.status.code(), Some(0), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let json = stdout_json(&output);
    assert_eq!(json["status"], "accepted");
    assert_eq!(json["result"]["temperature_range"][0], 20.0);
    assert_eq!(json["result"]["temperature_range"][1], 40.0);
}

#[test]
fn assess_with_missing_images_requires_retake() {
    let output = cli()
        .args([
            "assess",
            "--rgb",
            "/nonexistent/pair_rgb.jpg",
            "--thermal",
            "/nonexistent/pair_thermal.png",
        ])
        .output()
        .expect("assess command");

    assert_eq!(output.status.code(), Some(2));
    let json = stdout_json(&output);
    assert_eq!(json["recommendation"], "RetakeRequired");
    assert!(json["details"]
        .as_str()
        .unwrap()
        .contains("Failed to load RGB"));
}

#[test]
fn camera_with_unreadable_image_fails() {
    let output = cli()
        .args(["camera", "--rgb", "/nonexistent/pair_rgb.jpg"])
        .output()
        .expect("camera command");

    assert_eq!(output.status.code(), Some(2));
    let json = stdout_json(&output);
    assert_eq!(json["status"], "failed");
    assert_eq!(json["result"]["reason"], "Failed to load RGB calibration image");
}

#[test]
fn seeded_baseline_is_reproducible() {
    let run = || {
        cli()
            .args(["baseline", "--seed", "7"])
            .output()
            .expect("baseline command")
    };
    let first = run();
    let second = run();

    assert!(matches!(first.status.code(), Some(0) | Some(2)));
    assert_eq!(first.stdout, second.stdout);

    let json = stdout_json(&first);
    let estimate = if json["status"] == "accepted" {
        &json["result"]
    } else {
        &json["result"]["estimate"]
    };
    assert_eq!(estimate["simulated"], true);
}

#[test]
fn session_commands_share_one_directory() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), "calib_1_rgb.jpg");
    touch(dir.path(), "calib_1_thermal.png");
    touch(dir.path(), "calib_2_rgb.jpg");

    let listed = cli()
        .args(["sessions", "--dir"])
        .arg(dir.path())
        .output()
        .expect("sessions command");
    assert!(listed.status.success());
    assert_eq!(stdout_json(&listed).as_array().map(Vec::len), Some(2));

    let stats = cli()
        .args(["stats", "--dir"])
        .arg(dir.path())
        .output()
        .expect("stats command");
    let stats = stdout_json(&stats);
    assert_eq!(stats["total_sessions"], 2);
    assert_eq!(stats["complete_sessions"], 1);
    assert_eq!(stats["rgb_only_sessions"], 1);
    assert_eq!(stats["total_captures"], 3);

    let deleted = cli()
        .args(["delete", "--id", "calib_1", "--dir"])
        .arg(dir.path())
        .output()
        .expect("delete command");
    assert_eq!(deleted.status.code(), Some(0));
    assert_eq!(stdout_json(&deleted)["deleted"], true);
    assert!(!dir.path().join("calib_1_rgb.jpg").exists());
    assert!(!dir.path().join("calib_1_thermal.png").exists());

    let again = cli()
        .args(["delete", "--id", "calib_1", "--dir"])
        .arg(dir.path())
        .output()
        .expect("delete command");
    assert_eq!(again.status.code(), Some(2));
}

#[test]
fn telemetry_flag_dumps_quality_event() {
    let output = cli()
        .args([
            "assess",
            "--telemetry",
            "--rgb",
            "/nonexistent/pair_rgb.jpg",
            "--thermal",
            "/nonexistent/pair_thermal.png",
        ])
        .output()
        .expect("assess command");

    // Stdout stays a single JSON document
    stdout_json(&output);
    let stderr = String::from_utf8(output.stderr).expect("stderr utf8");
    assert!(stderr.contains("quality_assessed"), "stderr: {stderr}");
}
