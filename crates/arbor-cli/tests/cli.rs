use anyhow::{Result, anyhow};
use arbor_cli::execute;
use arbor_test_support::SandboxFixture;
use serde_json::Value;

fn run(fixture: &SandboxFixture, args: &[&str]) -> Result<(i32, String)> {
    let storage = fixture.storage().display().to_string();
    let trash = fixture.trash().display().to_string();
    let thumbnails = fixture.thumbnails().display().to_string();
    let ledger = fixture.ledger_path().display().to_string();
    let mut argv = vec![
        "arbor",
        "--storage-root",
        storage.as_str(),
        "--trash-root",
        trash.as_str(),
        "--thumbnail-root",
        thumbnails.as_str(),
        "--ledger",
        ledger.as_str(),
        "--user",
        "tester",
    ];
    argv.extend_from_slice(args);
    let mut out = Vec::new();
    let code = execute(argv, &mut out);
    Ok((code, String::from_utf8(out)?))
}

fn json(text: &str) -> Result<Value> {
    Ok(serde_json::from_str(text)?)
}

#[test]
fn delete_list_and_restore_through_the_cli() -> Result<()> {
    let fixture = SandboxFixture::new()?;
    fixture.write("docs/report.txt", b"quarterly")?;

    let (code, _) = run(&fixture, &["rm", "/docs/report.txt"])?;
    assert_eq!(code, 0);
    assert!(!fixture.path("docs/report.txt").exists());

    let (code, listing) = run(&fixture, &["trash", "list", "--format", "json"])?;
    assert_eq!(code, 0);
    let records = json(&listing)?;
    let records = records.as_array().ok_or_else(|| anyhow!("expected array"))?;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["original_path"], "/docs/report.txt");
    assert_eq!(records[0]["deleted_by"]["username"], "tester");

    let (code, _) = run(&fixture, &["restore", "/docs/report.txt"])?;
    assert_eq!(code, 0);
    assert_eq!(fixture.read("docs/report.txt")?, b"quarterly");
    Ok(())
}

#[test]
fn partial_batch_exits_with_failure_code() -> Result<()> {
    let fixture = SandboxFixture::new()?;
    fixture.write("a.txt", b"a")?;

    let (code, output) = run(
        &fixture,
        &["mv", "/a.txt", "/missing.txt", "--dest", "/moved", "--format", "json"],
    )?;
    assert_eq!(code, 3);
    let outcome = json(&output)?;
    assert_eq!(outcome["succeeded"][0]["to"], "/moved/a.txt");
    assert_eq!(outcome["failed"][0]["item"], "/missing.txt");
    assert_eq!(fixture.read("moved/a.txt")?, b"a");
    Ok(())
}

#[test]
fn traversal_is_a_validation_error() -> Result<()> {
    let fixture = SandboxFixture::new()?;
    let (code, output) = run(&fixture, &["resolve", "/../../etc/passwd"])?;
    assert_eq!(code, 2);
    assert!(output.is_empty());
    Ok(())
}

#[test]
fn resolve_prints_the_real_path() -> Result<()> {
    let fixture = SandboxFixture::new()?;
    let (code, output) = run(&fixture, &["resolve", "docs/./notes.txt", "--format", "json"])?;
    assert_eq!(code, 0);
    let value = json(&output)?;
    assert_eq!(value["path"], "/docs/notes.txt");
    let real = value["real_path"]
        .as_str()
        .ok_or_else(|| anyhow!("missing real_path"))?;
    assert!(real.ends_with("notes.txt"));
    Ok(())
}

#[test]
fn zip_then_unzip_elsewhere() -> Result<()> {
    let fixture = SandboxFixture::new()?;
    fixture.write("project/src/main.txt", b"fn main")?;

    let (code, output) = run(
        &fixture,
        &["zip", "/project", "--name", "bundle", "--format", "json"],
    )?;
    assert_eq!(code, 0);
    assert_eq!(json(&output)?["path"], "/bundle.zip");

    let (code, _) = run(&fixture, &["unzip", "/bundle.zip", "--dest", "/restored"])?;
    assert_eq!(code, 0);
    assert_eq!(fixture.read("restored/project/src/main.txt")?, b"fn main");

    let (code, _) = run(&fixture, &["unzip", "/bundle.zip", "--dest", "/restored"])?;
    assert_eq!(code, 3);
    Ok(())
}

#[test]
fn overlapping_trash_root_is_rejected() -> Result<()> {
    let fixture = SandboxFixture::new()?;
    let storage = fixture.storage().display().to_string();
    let inside = fixture.path(".trash").display().to_string();
    let mut out = Vec::new();
    let code = execute(
        [
            "arbor",
            "--storage-root",
            storage.as_str(),
            "--trash-root",
            inside.as_str(),
            "trash",
            "list",
        ],
        &mut out,
    );
    assert_eq!(code, 2);
    Ok(())
}

#[test]
fn mkdir_then_put_a_local_file() -> Result<()> {
    let fixture = SandboxFixture::new()?;
    let local = fixture.base().join("outside.txt");
    std::fs::write(&local, b"uploaded")?;
    let local = local.display().to_string();
    let local = local.as_str();

    let (code, output) = run(&fixture, &["mkdir", "/", "inbox", "--format", "json"])?;
    assert_eq!(code, 0);
    assert_eq!(json(&output)?["path"], "/inbox");

    let (code, _) = run(&fixture, &["mkdir", "/", "inbox"])?;
    assert_eq!(code, 3);

    let (code, output) = run(&fixture, &["put", local, "--dest", "/inbox", "--format", "json"])?;
    assert_eq!(code, 0);
    assert_eq!(json(&output)?["path"], "/inbox/outside.txt");

    let (code, output) = run(
        &fixture,
        &["put", local, "--dest", "/inbox", "--name", "copy.txt", "--format", "json"],
    )?;
    assert_eq!(code, 0);
    assert_eq!(json(&output)?["size"], 8);
    assert_eq!(fixture.read("inbox/copy.txt")?, b"uploaded");

    let (code, _) = run(&fixture, &["put", local, "--dest", "/inbox", "--policy", "skip"])?;
    assert_eq!(code, 3);
    Ok(())
}
