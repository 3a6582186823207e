use std::process::Command;

use latticefield::{FieldSettings, ShapeKind};

#[test]
fn dump_settings_prints_only_the_merged_json() {
    let output = Command::new(env!("CARGO_BIN_EXE_latticefield"))
        .args([
            "--dump-settings",
            "--resolution",
            "32",
            "--shape",
            "torus",
            "--seed",
            "5",
        ])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.ends_with('\n'));
    let settings = FieldSettings::from_json(stdout.trim_end()).unwrap();
    assert_eq!(
        settings,
        FieldSettings {
            resolution: 32,
            shape: ShapeKind::Torus,
            seed: 5,
            ..FieldSettings::default()
        }
    );
}
