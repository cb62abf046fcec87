//! Integration tests for core CLI contract behavior.

use {predicates::prelude::*, std::fs, tempfile::tempdir};

const MISSING_PORT: &str = "/dev/hexlink-test-no-such-port";

fn cli_cmd() -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("hexlink");
    cmd.env("HEXLINK_LANG", "en")
        .env("NO_COLOR", "1")
        .env_remove("HEXLINK_PORT")
        .env_remove("HEXLINK_BAUD")
        .env_remove("RUST_LOG");
    cmd
}

fn write_image(dir: &std::path::Path) -> std::path::PathBuf {
    let image = dir.join("firmware.hex");
    fs::write(&image, ":10000000AA\n:00000001FF\n").expect("image should be written");
    image
}

#[test]
fn help_exits_zero_and_writes_stdout_only() {
    cli_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("hexlink"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn version_exits_zero_and_writes_stdout_only() {
    cli_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")))
        .stderr(predicate::str::is_empty());
}

#[test]
fn exit_code_two_without_image_argument() {
    cli_cmd()
        .assert()
        .code(2)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn exit_code_two_for_extra_positional() {
    cli_cmd()
        .args(["a.hex", "b.hex"])
        .assert()
        .code(2);
}

#[test]
fn exit_code_two_for_usage_error_invalid_flag() {
    cli_cmd()
        .args(["--definitely-not-a-flag", "a.hex"])
        .assert()
        .code(2);
}

#[test]
fn exit_code_two_for_directory_image() {
    let dir = tempdir().expect("tempdir should be created");

    cli_cmd()
        .current_dir(dir.path())
        .arg(dir.path())
        .args(["-p", MISSING_PORT])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("directory"));
}

#[test]
fn exit_code_one_for_missing_image() {
    let dir = tempdir().expect("tempdir should be created");
    let missing = dir.path().join("missing.hex");

    cli_cmd()
        .current_dir(dir.path())
        .arg(&missing)
        .args(["-p", MISSING_PORT])
        .assert()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Error"))
        .stderr(predicate::str::contains("missing.hex"));
}

#[test]
fn exit_code_four_for_port_that_cannot_be_opened() {
    let dir = tempdir().expect("tempdir should be created");
    let image = write_image(dir.path());

    cli_cmd()
        .current_dir(dir.path())
        .arg(&image)
        .args(["-p", MISSING_PORT])
        .assert()
        .code(4)
        .stderr(predicate::str::contains(MISSING_PORT));
}

#[test]
fn port_is_taken_from_environment() {
    let dir = tempdir().expect("tempdir should be created");
    let image = write_image(dir.path());

    cli_cmd()
        .current_dir(dir.path())
        .env("HEXLINK_PORT", MISSING_PORT)
        .arg(&image)
        .assert()
        .code(4)
        .stderr(predicate::str::contains(MISSING_PORT));
}

#[test]
fn port_is_taken_from_local_config() {
    let dir = tempdir().expect("tempdir should be created");
    let image = write_image(dir.path());
    fs::write(
        dir.path().join("hexlink.toml"),
        format!("[port]\nserial = \"{MISSING_PORT}\"\n"),
    )
    .expect("config should be written");

    cli_cmd()
        .current_dir(dir.path())
        .arg(&image)
        .assert()
        .code(4)
        .stderr(predicate::str::contains(MISSING_PORT));
}

#[test]
fn exit_code_three_for_config_error_invalid_file() {
    let dir = tempdir().expect("tempdir should be created");
    let image = write_image(dir.path());
    let config = dir.path().join("broken.toml");
    fs::write(&config, "[port\nserial = ").expect("config should be written");

    cli_cmd()
        .current_dir(dir.path())
        .arg(&image)
        .arg("--config")
        .arg(&config)
        .args(["-p", MISSING_PORT])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("broken.toml"));
}

#[test]
fn exit_code_three_for_missing_explicit_config() {
    let dir = tempdir().expect("tempdir should be created");
    let image = write_image(dir.path());

    cli_cmd()
        .current_dir(dir.path())
        .arg(&image)
        .args(["--config", "nowhere.toml", "-p", MISSING_PORT])
        .assert()
        .code(3);
}

#[test]
fn exit_code_three_for_invalid_transfer_settings() {
    let dir = tempdir().expect("tempdir should be created");
    let image = write_image(dir.path());
    let config = dir.path().join("zero-window.toml");
    fs::write(&config, "[transfer]\nack_window = 0\n").expect("config should be written");

    cli_cmd()
        .current_dir(dir.path())
        .arg(&image)
        .arg("--config")
        .arg(&config)
        .args(["-p", MISSING_PORT])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Invalid transfer settings"));
}

#[test]
fn exit_code_three_for_oversized_line_buffer_cap() {
    let dir = tempdir().expect("tempdir should be created");
    let image = write_image(dir.path());
    fs::write(
        dir.path().join("hexlink.toml"),
        "[transfer]\nline_buffer_cap = 9223372036854775807\n",
    )
    .expect("config should be written");

    cli_cmd()
        .current_dir(dir.path())
        .arg(&image)
        .args(["-p", MISSING_PORT])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("line buffer cap"))
        .stderr(predicate::str::contains("panicked").not());
}

#[test]
fn broken_local_config_is_reported_and_ignored() {
    let dir = tempdir().expect("tempdir should be created");
    let image = write_image(dir.path());
    fs::write(dir.path().join("hexlink.toml"), "not = [valid").expect("config should be written");

    cli_cmd()
        .current_dir(dir.path())
        .arg(&image)
        .args(["-p", MISSING_PORT])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("Failed to parse config file"));
}

#[test]
fn json_failure_before_transfer_keeps_stdout_clean() {
    let dir = tempdir().expect("tempdir should be created");
    let image = write_image(dir.path());

    cli_cmd()
        .current_dir(dir.path())
        .arg(&image)
        .args(["--json", "-p", MISSING_PORT])
        .assert()
        .code(4)
        .stdout(predicate::str::is_empty());
}

#[test]
fn quiet_suppresses_progress_messages() {
    let dir = tempdir().expect("tempdir should be created");
    let image = write_image(dir.path());

    cli_cmd()
        .current_dir(dir.path())
        .arg(&image)
        .args(["-q", "-p", MISSING_PORT])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("Loading image").not())
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn invalid_line_ending_value_is_a_usage_error() {
    cli_cmd()
        .args(["a.hex", "--line-ending", "cr"])
        .assert()
        .code(2);
}

#[test]
fn option_terminator_allows_dash_prefixed_image() {
    let dir = tempdir().expect("tempdir should be created");
    fs::write(dir.path().join("-image.hex"), ":00000001FF\n").expect("image should be written");

    cli_cmd()
        .current_dir(dir.path())
        .args(["-p", MISSING_PORT, "--", "-image.hex"])
        .assert()
        .code(4);
}
