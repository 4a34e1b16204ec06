use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::{TempDir, tempdir};

/// A vault, a config selecting the offline hashing provider, and a database
/// path outside the vault.
struct Fixture {
    _vault_dir: TempDir,
    _work_dir: TempDir,
    root: PathBuf,
    work: PathBuf,
    config: PathBuf,
    db: PathBuf,
}

fn fixture() -> Result<Fixture> {
    let vault_dir = tempdir()?;
    let work_dir = tempdir()?;
    let root = vault_dir.path().canonicalize()?;
    let work = work_dir.path().canonicalize()?;

    fs::create_dir_all(root.join("Conversations"))?;
    fs::write(
        root.join("Conversations/chat.md"),
        "## Overall Summary\nCompared espresso grinders.\n# Transcript\nUser: which burr?",
    )?;
    fs::write(root.join("bread.md"), "sourdough hydration ratios")?;

    let config = work.join("vault-ai.toml");
    fs::write(
        &config,
        "[embedding]\nprovider = \"hashing\"\ndimensions = 128\n",
    )?;
    let db = work.join("index.db");

    Ok(Fixture {
        _vault_dir: vault_dir,
        _work_dir: work_dir,
        root,
        work,
        config,
        db,
    })
}

/// Helper to run the CLI binary with the fixture's config and database
fn run_cli(fixture: &Fixture, args: &[&str]) -> Result<Output> {
    let output = Command::new(env!("CARGO_BIN_EXE_vault-ai-retriever"))
        .arg("--config")
        .arg(&fixture.config)
        .arg("--db")
        .arg(&fixture.db)
        .args(args)
        .env("RUST_LOG", "error") // Reduce log noise
        .output()?;
    Ok(output)
}

/// Runs from the work directory with the database left to its default location
fn run_cli_default_db(fixture: &Fixture, args: &[&str]) -> Result<Output> {
    let output = Command::new(env!("CARGO_BIN_EXE_vault-ai-retriever"))
        .arg("--config")
        .arg(&fixture.config)
        .args(args)
        .current_dir(&fixture.work)
        .env("RUST_LOG", "error")
        .output()?;
    Ok(output)
}

fn path_arg(path: &Path) -> &str {
    path.to_str().expect("utf-8 temp path")
}

#[test]
fn test_index_reports_updates_then_nothing() -> Result<()> {
    let fixture = fixture()?;

    let output = run_cli(&fixture, &["index", path_arg(&fixture.root)])?;
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.contains("Indexing completed, 2 files updated"));

    let output = run_cli(&fixture, &["index", path_arg(&fixture.root)])?;
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.contains("Indexing completed, 0 files updated"));
    assert!(stdout.contains("unchanged 2"));
    Ok(())
}

#[test]
fn test_index_missing_root_aborts() -> Result<()> {
    let fixture = fixture()?;
    let missing = fixture.root.join("does-not-exist");

    let output = run_cli(&fixture, &["index", path_arg(&missing)])?;
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr)?;
    assert!(stderr.contains("Indexing aborted"));
    Ok(())
}

#[test]
fn test_context_formats() -> Result<()> {
    let fixture = fixture()?;
    assert!(run_cli(&fixture, &["index", path_arg(&fixture.root)])?.status.success());

    let output = run_cli(&fixture, &["context", "sourdough hydration ratios"])?;
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.starts_with("Context from my note 'bread.md':\nsourdough hydration ratios\n\n"));

    let output = run_cli(
        &fixture,
        &["context", "sourdough hydration ratios", "--format", "message"],
    )?;
    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.starts_with(
        "sourdough hydration ratios\n\n--- Relevant context from my notes ---\nContext from my note 'bread.md':"
    ));

    let output = run_cli(
        &fixture,
        &["context", "sourdough hydration ratios", "-k", "1", "--format", "json"],
    )?;
    let json: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    let entries = json["entries"].as_array().expect("entries array");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["source_file_name"], "bread.md");

    // Nothing is strictly closer than zero
    let output = run_cli(
        &fixture,
        &["context", "sourdough hydration ratios", "--threshold", "0"],
    )?;
    assert!(output.status.success());
    assert!(output.stdout.is_empty());
    Ok(())
}

#[test]
fn test_default_database_lives_in_vault_root() -> Result<()> {
    let fixture = fixture()?;
    let root = path_arg(&fixture.root);

    let output = run_cli_default_db(&fixture, &["index", root])?;
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(fixture.root.join(".vault-ai.db").is_file());

    let output = run_cli_default_db(
        &fixture,
        &["--root", root, "context", "sourdough hydration ratios"],
    )?;
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.starts_with("Context from my note 'bread.md':\nsourdough hydration ratios\n\n"));

    let output = run_cli_default_db(&fixture, &["--root", root, "stats"])?;
    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.contains("Total records: 2"));

    // Re-indexing through --root finds the same database
    let output = run_cli_default_db(&fixture, &["--root", root, "index"])?;
    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.contains("Indexing completed, 0 files updated"));
    Ok(())
}

#[test]
fn test_readers_never_create_a_database() -> Result<()> {
    let fixture = fixture()?;
    let stray = fixture.work.join(".vault-ai.db");

    for args in [
        vec!["context", "sourdough hydration ratios"],
        vec!["get", "bread.md"],
        vec!["stats"],
    ] {
        let output = run_cli_default_db(&fixture, &args)?;
        assert_eq!(output.status.code(), Some(1));
        let stderr = String::from_utf8(output.stderr)?;
        assert!(stderr.contains("No index at"), "stderr: {stderr}");
        assert!(!stray.exists());
    }

    let output = run_cli(&fixture, &["stats"])?;
    assert_eq!(output.status.code(), Some(1));
    assert!(!fixture.db.exists());
    Ok(())
}

#[test]
fn test_get_and_stats() -> Result<()> {
    let fixture = fixture()?;
    assert!(run_cli(&fixture, &["index", path_arg(&fixture.root)])?.status.success());

    let chat = fixture.root.join("Conversations/chat.md");
    let output = run_cli(&fixture, &["get", path_arg(&chat), "--format", "json"])?;
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(json["embedded_text"], "Compared espresso grinders.");
    assert_eq!(json["metadata"]["source_category"], "conversation_summary");
    assert_eq!(json["dimension"], 128);

    let output = run_cli(&fixture, &["get", "/no/such/note.md"])?;
    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.contains("No record with id /no/such/note.md"));

    let output = run_cli(&fixture, &["stats"])?;
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.contains("Collection: obsidian_vault_main (l2)"));
    assert!(stdout.contains("Total records: 2"));
    assert!(stdout.contains("Conversation summaries: 1"));
    assert!(stdout.contains("Full notes: 1"));
    Ok(())
}

#[test]
fn test_invalid_format_is_rejected() -> Result<()> {
    let fixture = fixture()?;
    let output = run_cli(&fixture, &["stats", "--bogus"])?;
    assert!(!output.status.success());

    let output = run_cli(&fixture, &["get", "x", "--format", "yaml"])?;
    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr)?;
    assert!(stderr.contains("Invalid format: yaml"));
    Ok(())
}
