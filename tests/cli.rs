use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::io::Write;
use std::process::Command;
use tempfile::tempdir;

fn unpack() -> Result<Command, Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("unpack")?;
    cmd.env_remove("UNPACK_PASSWORD").env_remove("UNPACK_LOG");
    Ok(cmd)
}

#[test]
fn test_cli_add_list_extract_cycle() -> Result<(), Box<dyn std::error::Error>> {
    let source_dir = tempdir()?;
    let file1_path = source_dir.path().join("file1.txt");
    let file2_path = source_dir.path().join("file2.log");
    let nested_dir = source_dir.path().join("nested");
    fs::create_dir(&nested_dir)?;
    let nested_file_path = nested_dir.join("nested_file.dat");

    let mut file1 = fs::File::create(&file1_path)?;
    writeln!(file1, "Hello, this is the first file.")?;
    let mut file2 = fs::File::create(&file2_path)?;
    writeln!(file2, "Some log data here.")?;
    let mut nested_file = fs::File::create(&nested_file_path)?;
    nested_file.write_all(&[0, 1, 2, 3, 4, 5])?;

    let archive_dir = tempdir()?;
    for name in ["cycle.zip", "cycle.7z"] {
        let archive_path = archive_dir.path().join(name);

        unpack()?
            .arg("add")
            .arg(source_dir.path())
            .arg("-a")
            .arg(&archive_path)
            .assert()
            .success()
            .stdout(predicate::str::contains("Created"));
        assert!(archive_path.exists());

        unpack()?
            .arg("list")
            .arg(&archive_path)
            .assert()
            .success()
            .stdout(
                predicate::str::contains("file1.txt")
                    .and(predicate::str::contains("file2.log"))
                    .and(predicate::str::contains("nested/nested_file.dat")),
            );

        let extract_dir = tempdir()?;
        unpack()?
            .arg("extract")
            .arg(&archive_path)
            .arg("-o")
            .arg(extract_dir.path())
            .assert()
            .success();

        assert_eq!(fs::read(extract_dir.path().join("file1.txt"))?, fs::read(&file1_path)?);
        assert_eq!(fs::read(extract_dir.path().join("file2.log"))?, fs::read(&file2_path)?);
        assert_eq!(
            fs::read(extract_dir.path().join("nested/nested_file.dat"))?,
            fs::read(&nested_file_path)?
        );

        unpack()?
            .arg("test")
            .arg(&archive_path)
            .assert()
            .success()
            .stdout(predicate::str::contains("3 file entries verified"));
    }
    Ok(())
}

#[test]
fn test_cli_wrong_password_fails_with_exit_code_1() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let src = dir.path().join("secret.txt");
    fs::write(&src, b"top secret")?;
    let archive = dir.path().join("locked.zip");

    unpack()?
        .args(["add", "--password", "right"])
        .arg(&src)
        .arg("-a")
        .arg(&archive)
        .assert()
        .success();

    let out = dir.path().join("out");
    unpack()?
        .args(["extract", "--password", "wrong"])
        .arg(&archive)
        .arg("-o")
        .arg(&out)
        .assert()
        .code(1)
        .stderr(predicate::str::starts_with("Error:").and(predicate::str::contains("password")));
    assert!(!out.exists());

    unpack()?
        .arg("extract")
        .arg(&archive)
        .arg("-o")
        .arg(&out)
        .env("UNPACK_PASSWORD", "right")
        .assert()
        .success();
    assert_eq!(fs::read(out.join("secret.txt"))?, b"top secret");
    Ok(())
}

#[test]
fn test_cli_list_json() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let src = dir.path().join("data.bin");
    fs::write(&src, vec![7u8; 1000])?;
    let archive = dir.path().join("j.zip");
    unpack()?.arg("a").arg(&src).arg("-a").arg(&archive).assert().success();

    let output = unpack()?.args(["list", "--json"]).arg(&archive).output()?;
    assert!(output.status.success());
    let entries: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(entries[0]["key"], "data.bin");
    assert_eq!(entries[0]["size"], 1000);
    assert_eq!(entries[0]["is_encrypted"], false);
    Ok(())
}

#[test]
fn test_cli_volume_split_is_refused() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let src = dir.path().join("f.txt");
    fs::write(&src, b"x")?;
    let archive = dir.path().join("split.7z");

    unpack()?
        .arg("add")
        .arg(&src)
        .arg("-a")
        .arg(&archive)
        .args(["--volume", "100MB"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not supported"));
    assert!(!archive.exists());
    Ok(())
}

#[test]
fn test_cli_unrecognised_volume_size_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let src = dir.path().join("a.txt");
    fs::write(&src, b"x")?;
    let archive = dir.path().join("out.zip");

    unpack()?
        .arg("add")
        .arg(&src)
        .arg("-a")
        .arg(&archive)
        .args(["--volume", "lots"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Created").not())
        .stderr(predicate::str::contains("unrecognised volume size 'lots'"));
    assert!(!archive.exists());

    unpack()?
        .arg("add")
        .arg(&src)
        .arg("-a")
        .arg(&archive)
        .args(["--volume", "No splitting"])
        .assert()
        .success();
    assert!(archive.exists());
    Ok(())
}

#[test]
fn test_cli_quick_actions() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let project = dir.path().join("project");
    fs::create_dir_all(project.join("src"))?;
    fs::write(project.join("src/main.txt"), b"fn main")?;
    fs::write(project.join("README"), b"readme")?;

    unpack()?.arg("compress-7z").arg(&project).assert().success();
    let archive = dir.path().join("project.7z");
    assert!(archive.exists());

    fs::remove_dir_all(&project)?;
    unpack()?.arg("extract-to-subdir").arg(&archive).assert().success();
    assert_eq!(fs::read(project.join("src/main.txt"))?, b"fn main");
    assert_eq!(fs::read(project.join("README"))?, b"readme");
    Ok(())
}

#[test]
fn test_cli_missing_sfx_module_keeps_archive() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let src = dir.path().join("payload.txt");
    fs::write(&src, b"payload")?;
    let exe = dir.path().join("installer.exe");

    unpack()?
        .arg("add")
        .arg(&src)
        .arg("-a")
        .arg(&exe)
        .args(["--type", "zip", "--sfx"])
        .arg("--sfx-dir")
        .arg(dir.path().join("no-stubs-here"))
        .env("UNPACK_TEMP_DIR", dir.path().join("staging"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("SFX module not found"));

    assert!(!exe.exists());
    assert!(dir.path().join("installer.zip").exists());
    Ok(())
}
