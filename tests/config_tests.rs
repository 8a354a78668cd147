use std::io::Write;

use codescan::detect::CodeFormat;
use codescan::display::{FrameGravity, LaserStyle};
use codescan::error::SetupError;
use codescan::geometry::FitMode;
use codescan::Config;

fn write_toml(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn file_overrides_defaults() {
    let file = write_toml(
        r#"
[scanner]
format = "qr"
play_beep = false

[light]
dark_lux = 30.0

[viewfinder]
laser_style = "grid"
frame_gravity = "top"
frame_padding_top = 48.0

[pipeline]
fit_mode = "fit"
"#,
    );

    let config = Config::load(Some(file.path())).unwrap();
    assert_eq!(config.scanner.format, CodeFormat::QrCode);
    assert!(!config.scanner.play_beep);
    assert_eq!(config.light.dark_lux, 30.0);
    assert_eq!(config.viewfinder.laser_style, LaserStyle::Grid);
    assert_eq!(config.viewfinder.frame_gravity, FrameGravity::Top);
    assert_eq!(config.viewfinder.frame_padding_top, 48.0);
    assert_eq!(config.pipeline.fit_mode, FitMode::Fit);

    // Untouched sections keep their defaults
    assert_eq!(config.camera, Config::default().camera);
    assert_eq!(config.pipeline.still_wait_ms, 2000);
}

#[test]
fn invalid_values_are_rejected() {
    let file = write_toml("[light]\ndark_lux = 500.0\n");
    assert!(matches!(Config::load(Some(file.path())), Err(SetupError::Config(_))));

    let file = write_toml("[viewfinder]\nframe_ratio = 1.5\n");
    assert!(matches!(Config::load(Some(file.path())), Err(SetupError::Config(_))));

    let file = write_toml("[scanner]\nformat = \"aztec\"\n");
    assert!(matches!(Config::load(Some(file.path())), Err(SetupError::Load(_))));
}

#[test]
fn missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    assert!(matches!(Config::load(Some(&path)), Err(SetupError::Load(_))));
}

#[test]
fn environment_overrides_file() {
    let file = write_toml("[light]\nbright_lux = 150.0\ninterval_ms = 500\n");

    std::env::set_var("CODESCAN__LIGHT__BRIGHT_LUX", "180");
    let config = Config::load(Some(file.path()));
    std::env::remove_var("CODESCAN__LIGHT__BRIGHT_LUX");

    let config = config.unwrap();
    assert_eq!(config.light.bright_lux, 180.0);
    assert_eq!(config.light.interval_ms, 500);
    assert_eq!(config.session_options().bright_lux, 180.0);
}
