use assert_cmd::Command;
use predicates::str::contains;
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use walkdir::WalkDir;

fn cli() -> Command {
    Command::new(env!("CARGO_BIN_EXE_formport"))
}

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn sample_project(temp: &TempDir) -> std::path::PathBuf {
    let root = temp.path().join("Shop");
    write(
        &root,
        "Default.aspx",
        "<%@ Page Title=\"Home\" Language=\"C#\" CodeBehind=\"Default.aspx.cs\" %>\n<asp:Label ID=\"Greeting\" runat=\"server\" Text=\"Hi\" />\n",
    );
    write(
        &root,
        "Default.aspx.cs",
        "using System;\nusing System.Web.UI;\n\nnamespace Shop\n{\n    public partial class _Default : Page\n    {\n        protected void Page_Load(object sender, EventArgs e)\n        {\n        }\n    }\n}\n",
    );
    write(&root, "Content/site.css", "body {}");
    root
}

fn relative_files(root: &Path) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            entry
                .path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect();
    files.sort();
    files
}

#[test]
fn migrate_writes_the_output_tree() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    let project = sample_project(&temp);
    let out = temp.path().join("out");

    let mut cmd = cli();
    cmd.arg("migrate")
        .arg(&project)
        .arg("--output")
        .arg(&out)
        .arg("--namespace")
        .arg("Acme.Shop");

    cmd.assert()
        .success()
        .stdout(contains("Migration OK"))
        .stdout(contains("3 discovered, 3 converted, 0 failed"));

    let files = relative_files(&out);
    for expected in [
        "App.razor",
        "Pages/Default.razor",
        "Pages/Default.razor.cs",
        "Pages/_Host.cshtml",
        "Program.cs",
        "_Imports.razor",
        "migration-report.json",
        "wwwroot/Content/site.css",
    ] {
        assert!(files.iter().any(|file| file == expected), "missing {expected}: {files:?}");
    }
    let page = fs::read_to_string(out.join("Pages/Default.razor"))?;
    assert!(page.contains("@namespace Acme.Shop"));
    assert!(project.join("Default.aspx").exists());
    Ok(())
}

#[test]
fn migrate_defaults_to_a_sibling_directory() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    let project = sample_project(&temp);

    cli().arg("migrate").arg(&project).assert().success();

    assert!(temp.path().join("Shop.Migrated/Pages/Default.razor").is_file());
    Ok(())
}

#[test]
fn migrate_in_place_removes_sources() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    let project = sample_project(&temp);

    cli()
        .args(["migrate", "--in-place"])
        .arg(&project)
        .assert()
        .success()
        .stdout(contains("(in place)"));

    assert!(!project.join("Default.aspx").exists());
    assert!(!project.join("Default.aspx.cs").exists());
    assert!(!project.join("Content").exists());
    assert!(project.join("Pages/Default.razor").is_file());
    assert!(project.join("wwwroot/Content/site.css").is_file());
    Ok(())
}

#[test]
fn migrate_json_reports_the_run() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    let project = sample_project(&temp);
    let out = temp.path().join("out");

    let assert = cli()
        .arg("migrate")
        .arg(&project)
        .arg("--output")
        .arg(&out)
        .arg("--json")
        .assert()
        .success();

    let payload: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout)?;
    assert_eq!(payload["type"], "migrated");
    assert_eq!(payload["in_place"], false);
    assert_eq!(payload["report"]["discovered"], 3);
    assert_eq!(payload["report"]["failed"], serde_json::json!([]));
    Ok(())
}

#[test]
fn invalid_config_is_a_config_error() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    let project = sample_project(&temp);
    let config = temp.path().join("formport.yaml");
    fs::write(&config, "watchdog: [1, 2]\n")?;

    cli()
        .arg("migrate")
        .arg(&project)
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .code(78)
        .stderr(contains("configuration error"));
    Ok(())
}

#[test]
fn missing_project_is_a_usage_error() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;

    cli()
        .arg("migrate")
        .arg(temp.path().join("nope"))
        .assert()
        .failure()
        .code(64)
        .stderr(contains("is not a directory"));
    Ok(())
}

#[test]
fn output_and_in_place_are_exclusive() {
    cli()
        .args(["migrate", "Shop", "--output", "out", "--in-place"])
        .assert()
        .failure()
        .code(64);
}
