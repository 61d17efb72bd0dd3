mod openai_stub;

use std::path::Path;

use predicates::prelude::*;

use openai_stub::{OpenAiStub, OpenAiStubConfig};
use trialdigest::literature::{CDE_REGISTRY_LABEL, FOREIGN_TRIAL_LABEL, PACKAGE_INSERT_LABEL};

fn write_config(dir: &Path, base: &Path) -> anyhow::Result<std::path::PathBuf> {
    let path = dir.join("trialdigest.yaml");
    std::fs::write(
        &path,
        format!(
            "base_path: {}\nproviders_file: providers.yaml\n",
            serde_json::to_string(&base.to_string_lossy())?
        ),
    )?;
    Ok(path)
}

#[test]
fn help_lists_subcommands() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("trialdigest");
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("folders"))
        .stdout(predicate::str::contains("extract"))
        .stdout(predicate::str::contains("extract-file"))
        .stdout(predicate::str::contains("summarize"))
        .stdout(predicate::str::contains("render"));
}

#[test]
fn folders_prints_one_name_per_line() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let base = temp.path().join("data");
    std::fs::create_dir_all(base.join("beta"))?;
    std::fs::create_dir_all(base.join("alpha"))?;
    std::fs::write(base.join("notes.txt"), "x")?;
    let config = write_config(temp.path(), &base)?;

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("trialdigest");
    cmd.arg("--config")
        .arg(&config)
        .args(["folders", "--path"])
        .arg(&base)
        .assert()
        .success()
        .stdout("alpha\nbeta\n");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("trialdigest");
    cmd.arg("--config")
        .arg(&config)
        .args(["folders", "--path"])
        .arg(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("outside the allowed directories"));
    Ok(())
}

#[test]
fn extract_prints_the_batch_report() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let base = temp.path().join("data");
    let auto = base.join(CDE_REGISTRY_LABEL).join("ctr-1").join("auto");
    std::fs::create_dir_all(&auto)?;
    std::fs::write(auto.join("ctr-1.md"), "# 注册信息")?;
    let config = write_config(temp.path(), &base)?;

    let stub = OpenAiStub::spawn(OpenAiStubConfig::default());
    std::fs::write(
        temp.path().join("providers.yaml"),
        stub.providers_yaml("YUNWU-OPENAI", "sk-stub"),
    )?;

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("trialdigest");
    let output = cmd
        .arg("--config")
        .arg(&config)
        .env("RUST_LOG", "debug")
        .args(["extract", "--item"])
        .arg(format!("{CDE_REGISTRY_LABEL}/ctr-1"))
        .arg("--item")
        .arg(format!("{FOREIGN_TRIAL_LABEL}/missing"))
        .assert()
        .success()
        .stderr(predicate::str::contains("completion request"))
        .get_output()
        .stdout
        .clone();

    let report: serde_json::Value = serde_json::from_slice(&output)?;
    assert_eq!(report["total_processed"], 2);
    assert_eq!(report["results"][0]["drug_name"], "试验药物名称/代号的值");
    assert!(report["results"][1]["error"].is_string());
    Ok(())
}

#[test]
fn extract_file_picks_the_schema_from_the_category() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let base = temp.path().join("data");
    std::fs::create_dir_all(&base)?;
    let doc = base.join("loose-notes.md");
    std::fs::write(&doc, "# 试验记录")?;
    let config = write_config(temp.path(), &base)?;

    let stub = OpenAiStub::spawn(OpenAiStubConfig::default());
    std::fs::write(
        temp.path().join("providers.yaml"),
        stub.providers_yaml("YUNWU-OPENAI", "sk-stub"),
    )?;

    let run = |category: &str| -> anyhow::Result<serde_json::Value> {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("trialdigest");
        let output = cmd
            .arg("--config")
            .arg(&config)
            .args(["extract-file", "--file"])
            .arg(&doc)
            .args(["--category", category])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        Ok(serde_json::from_slice(&output)?)
    };

    let foreign = run(FOREIGN_TRIAL_LABEL)?;
    assert_eq!(foreign["section_name"], FOREIGN_TRIAL_LABEL);
    assert_eq!(foreign["literature_name"], "loose-notes");
    assert!(foreign["reference_level"].is_string());
    assert!(foreign.get("company_name").is_none());

    // Labels without their own schema fall back to the registry one.
    let fallback = run(PACKAGE_INSERT_LABEL)?;
    assert_eq!(fallback["section_name"], CDE_REGISTRY_LABEL);
    assert!(fallback["company_name"].is_string());

    let names = stub
        .requests()
        .iter()
        .map(|r| r["response_format"]["json_schema"]["name"].clone())
        .collect::<Vec<_>>();
    assert_eq!(names.len(), 2);
    assert_ne!(names[0], names[1]);

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("trialdigest");
    cmd.arg("--config")
        .arg(&config)
        .args(["extract-file", "--file"])
        .arg(temp.path().join("providers.yaml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("outside the allowed directories"));
    Ok(())
}

#[test]
fn render_writes_docx_and_refuses_to_overwrite() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let summary = temp.path().join("summary.json");
    std::fs::write(
        &summary,
        serde_json::json!({
            "success": true,
            "summary": { "study_title": "A trial", "trial_phase": "II期" }
        })
        .to_string(),
    )?;
    let out = temp.path().join("out").join("方案摘要.docx");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("trialdigest");
    cmd.args(["render", "--summary"])
        .arg(&summary)
        .arg("--out")
        .arg(&out)
        .assert()
        .success();

    let bytes = std::fs::read(&out)?;
    assert!(bytes.starts_with(b"PK"));
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))?;
    let mut document = String::new();
    std::io::Read::read_to_string(&mut archive.by_name("word/document.xml")?, &mut document)?;
    assert!(document.contains("A trial"));

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("trialdigest");
    cmd.args(["render", "--summary"])
        .arg(&summary)
        .arg("--out")
        .arg(&out)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("trialdigest");
    cmd.args(["render", "--force", "--summary"])
        .arg(&summary)
        .arg("--out")
        .arg(&out)
        .assert()
        .success();
    Ok(())
}
