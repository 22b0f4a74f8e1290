use std::{
    path::{Path, PathBuf},
    process::{Command, Output},
};

use neardup::{DocumentDb, SignatureStore};

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn setup_fixture(root: &Path) -> Result<(PathBuf, PathBuf), std::io::Error> {
    let known = root.join("known");
    let incoming = root.join("incoming");
    std::fs::create_dir_all(known.join("nested"))?;
    std::fs::create_dir_all(&incoming)?;

    std::fs::write(
        known.join("fox.txt"),
        "the quick brown fox jumps over the lazy dog\n",
    )?;
    std::fs::write(
        known.join("nested/ledger.txt"),
        "quarterly revenue grew by four percent in the northern region\n",
    )?;
    std::fs::write(known.join(".hidden.txt"), "never ingested at all\n")?;
    std::fs::write(known.join("tiny.txt"), "short")?;

    std::fs::write(
        incoming.join("copy.txt"),
        "<p>The QUICK brown fox jumps over the lazy dog!</p>\n",
    )?;
    std::fs::write(
        incoming.join("fresh.txt"),
        "completely unrelated notes about gardening and tomatoes\n",
    )?;

    Ok((known, incoming))
}

fn neardup(data_dir: &Path, args: &[&str]) -> Result<Output, std::io::Error> {
    Command::new(env!("CARGO_BIN_EXE_neardup"))
        .arg("--data-dir")
        .arg(data_dir)
        .arg("--quiet")
        .args(args)
        .env_remove("NEARDUP_LOG")
        .output()
}

fn path_arg(path: &Path) -> &str {
    path.to_str().expect("tempdir paths are UTF-8")
}

#[test]
fn ingest_then_match() -> TestResult {
    let tempdir = tempfile::tempdir()?;
    let (known, incoming) = setup_fixture(tempdir.path())?;
    let data_dir = tempdir.path().join("data");

    let out = neardup(
        &data_dir,
        &[
            "ingest",
            path_arg(&known),
            "--label",
            "privileged",
            "--prefix",
            "known",
            "--signatures",
        ],
    )?;
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let out = neardup(
        &data_dir,
        &["ingest", path_arg(&incoming), "--prefix", "incoming"],
    )?;
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let out = neardup(&data_dir, &["match"])?;
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8(out.stdout)?;
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines, ["incoming/copy.txt  # similar to known/fox.txt"]);

    let out = neardup(&data_dir, &["match", "--verbose-scores"])?;
    assert!(out.status.success());
    assert_eq!(
        String::from_utf8(out.stdout)?.trim_end(),
        "incoming/copy.txt  # max 1.000 matches known/fox.txt"
    );

    let out = neardup(&data_dir, &["match", "--json"])?;
    assert!(out.status.success());
    let value: serde_json::Value =
        serde_json::from_str(String::from_utf8(out.stdout)?.trim_end())?;
    assert_eq!(value["query"], "incoming/copy.txt");
    assert_eq!(value["matches"][0]["id"], "known/fox.txt");
    assert_eq!(value["matches"][0]["similarity"], 1.0);

    Ok(())
}

#[test]
fn status_reports_documents() -> TestResult {
    let tempdir = tempfile::tempdir()?;
    let (known, incoming) = setup_fixture(tempdir.path())?;
    let data_dir = tempdir.path().join("data");

    neardup(
        &data_dir,
        &["ingest", path_arg(&known), "-l", "privileged", "--prefix", "k"],
    )?;
    neardup(&data_dir, &["ingest", path_arg(&incoming), "--prefix", "i"])?;

    let out = neardup(&data_dir, &["status", "--json"])?;
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let status: serde_json::Value = serde_json::from_slice(&out.stdout)?;
    assert_eq!(status["condenser"], "ws:norm-html:sha1:128");
    assert_eq!(status["documents"], 4);
    assert_eq!(status["labeled"], 2);
    assert_eq!(status["signatures"], 0);

    // The binary and the library agree on the on-disk layout.
    let db = DocumentDb::open(&data_dir.join("documents.redb"))?;
    let record = db.get_document("k/nested/ledger.txt")?;
    assert_eq!(record.label.as_deref(), Some("privileged"));
    assert!(db.find_document("k/.hidden.txt")?.is_none());
    assert!(db.find_document("k/tiny.txt")?.is_none());

    Ok(())
}

#[test]
fn compare_ranks_stored_documents() -> TestResult {
    let tempdir = tempfile::tempdir()?;
    let (known, incoming) = setup_fixture(tempdir.path())?;
    let data_dir = tempdir.path().join("data");

    neardup(&data_dir, &["ingest", path_arg(&known), "--prefix", "known"])?;

    let query = incoming.join("copy.txt");
    let out = neardup(
        &data_dir,
        &["compare", path_arg(&query), "--threshold", "0.5", "--json"],
    )?;
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let ranked: serde_json::Value = serde_json::from_slice(&out.stdout)?;
    let ranked = ranked.as_array().ok_or("expected an array")?;
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0]["id"], "known/fox.txt");

    Ok(())
}

#[test]
fn conflicting_spec_is_rejected() -> TestResult {
    let tempdir = tempfile::tempdir()?;
    let (known, incoming) = setup_fixture(tempdir.path())?;
    let data_dir = tempdir.path().join("data");

    let out = neardup(
        &data_dir,
        &["ingest", path_arg(&known), "--spec", "3-grams:norm::64"],
    )?;
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let out = neardup(
        &data_dir,
        &["ingest", path_arg(&incoming), "--spec", "ws:norm::128"],
    )?;
    assert!(!out.status.success());

    let out = neardup(&data_dir, &["match", "--spec", "bogus"])?;
    assert!(!out.status.success());

    Ok(())
}

#[test]
fn missing_directory_fails() -> TestResult {
    let tempdir = tempfile::tempdir()?;
    let data_dir = tempdir.path().join("data");
    let missing = tempdir.path().join("nope");

    let out = neardup(&data_dir, &["ingest", path_arg(&missing)])?;
    assert!(!out.status.success());

    Ok(())
}

#[test]
fn match_threshold_must_be_below_one() -> TestResult {
    let tempdir = tempfile::tempdir()?;
    let (known, _) = setup_fixture(tempdir.path())?;
    let data_dir = tempdir.path().join("data");

    neardup(&data_dir, &["ingest", path_arg(&known), "-l", "privileged"])?;

    let out = neardup(&data_dir, &["match", "--threshold", "1.0"])?;
    assert!(!out.status.success());
    let out = neardup(&data_dir, &["match", "--threshold", "0.99"])?;
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    Ok(())
}

#[test]
fn colliding_ids_are_refused() -> TestResult {
    let tempdir = tempfile::tempdir()?;
    let root = tempdir.path();
    let data_dir = root.join("data");
    for dir in ["first", "second"] {
        std::fs::create_dir_all(root.join(dir))?;
        std::fs::write(
            root.join(dir).join("notes.txt"),
            format!("meeting notes from the {dir} office about budgets\n"),
        )?;
    }

    let out = neardup(
        &data_dir,
        &["ingest", path_arg(&root.join("first")), "-l", "privileged"],
    )?;
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let out = neardup(&data_dir, &["ingest", path_arg(&root.join("second"))])?;
    assert!(!out.status.success());

    let db = DocumentDb::open(&data_dir.join("documents.redb"))?;
    let record = db.get_document("notes.txt")?;
    assert_eq!(record.path, root.join("first/notes.txt").canonicalize()?);
    assert_eq!(record.label.as_deref(), Some("privileged"));

    Ok(())
}

#[test]
fn remove_and_reset() -> TestResult {
    let tempdir = tempfile::tempdir()?;
    let (known, _) = setup_fixture(tempdir.path())?;
    let data_dir = tempdir.path().join("data");

    let out = neardup(
        &data_dir,
        &["ingest", path_arg(&known), "--prefix", "k", "--signatures"],
    )?;
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let out = neardup(&data_dir, &["remove", "k/fox.txt", "k/missing.txt"])?;
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let out = neardup(&data_dir, &["status", "--json"])?;
    let status: serde_json::Value = serde_json::from_slice(&out.stdout)?;
    assert_eq!(status["documents"], 1);
    assert_eq!(status["signatures"], 1);

    let out = neardup(&data_dir, &["reset"])?;
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    // The recorded condenser is gone, so a different one is accepted.
    let out = neardup(
        &data_dir,
        &["ingest", path_arg(&known), "--prefix", "k", "--spec", "3-grams:norm::64"],
    )?;
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let out = neardup(&data_dir, &["status", "--json"])?;
    let status: serde_json::Value = serde_json::from_slice(&out.stdout)?;
    assert_eq!(status["condenser"], "3-grams:norm:sha1:64");
    assert_eq!(status["signatures"], 0);

    Ok(())
}
