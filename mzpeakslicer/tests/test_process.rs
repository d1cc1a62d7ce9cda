use std::{error::Error, io::Write, process::Command};

use assert_cmd::prelude::*;
use predicates::prelude::*;

#[test]
fn test_file_missing() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("mzpeakslicer")?;

    cmd.arg("not_real.mzML").arg("-o").arg("-");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("InputError(\"not_real.mzML\""));
    Ok(())
}

#[test]
fn test_malformed_time_range() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("mzpeakslicer")?;

    cmd.arg("not_real.mzML").args(["-o", "-", "-r", "a-z"]);
    cmd.assert().failure().stderr(predicate::str::contains(
        "Failed to parse range start invalid float literal",
    ));

    let mut cmd = Command::cargo_bin("mzpeakslicer")?;

    cmd.arg("not_real.mzML").args(["-o", "-", "--time-range=-a"]);
    cmd.assert().failure().stderr(predicate::str::contains(
        "Failed to parse range end invalid float literal",
    ));

    Ok(())
}

#[test]
fn test_invalid_configuration_fails_before_reading() -> Result<(), Box<dyn Error>> {
    let mut config = tempfile::NamedTempFile::new()?;
    writeln!(config, "slice_width = -1.0")?;

    let mut cmd = Command::cargo_bin("mzpeakslicer")?;
    cmd.arg("not_real.mzML").arg("--config-file").arg(config.path());
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("slice width must be positive"))
        .stderr(predicate::str::contains("not_real.mzML\"").not());
    Ok(())
}

#[test]
fn test_mismatched_target_tolerances() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("mzpeakslicer")?;
    cmd.arg("not_real.mzML").args([
        "--target",
        "400.2",
        "--target-tolerance",
        "0.01",
        "--target-tolerance",
        "0.02",
    ]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("per-target tolerances"));
    Ok(())
}

#[test]
fn test_help() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("mzpeakslicer")?;
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("--slice-width"))
        .stdout(predicate::str::contains("--ion-mobility"));
    Ok(())
}
