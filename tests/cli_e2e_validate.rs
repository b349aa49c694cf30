//! End-to-end tests for the validate command.

mod common;
use common::prelude::*;

#[test]
fn test_validate_pinned_config() {
    let fixture = TestFixture::new().with_config(configs::PINNED);

    fixture
        .command()
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration file parsed successfully"))
        .stdout(predicate::str::contains("Best-effort: vendor"))
        .stdout(predicate::str::contains("1 excluded commits"))
        .stdout(predicate::str::contains("[WARN]").not());
}

#[test]
fn test_validate_explicit_config_path() {
    let fixture = TestFixture::new();
    fixture
        .child("conf/kernel.yaml")
        .write_str(configs::PINNED)
        .unwrap();

    fixture
        .command()
        .arg("validate")
        .arg("--config")
        .arg("conf/kernel.yaml")
        .assert()
        .success()
        .stdout(predicate::str::contains("conf/kernel.yaml"));
}

#[test]
fn test_validate_config_from_environment() {
    let fixture = TestFixture::new();
    fixture.child("env.yaml").write_str(configs::PINNED).unwrap();

    fixture
        .command()
        .env("PATCHPIN_CONFIG", "env.yaml")
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("env.yaml"));
}

#[test]
fn test_validate_warns_about_branch_tracking() {
    let fixture = TestFixture::new().with_config(configs::BRANCH_TRACKING);

    fixture
        .command()
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "linux follows branch main without a pinned ref",
        ))
        .stdout(predicate::str::contains("vendor has no upstream"));
}

#[test]
fn test_validate_strict_fails_on_warnings() {
    let fixture = TestFixture::new().with_config(configs::BRANCH_TRACKING);

    fixture
        .command()
        .arg("validate")
        .arg("--strict")
        .assert()
        .failure()
        .stdout(predicate::str::contains("strict mode enabled"));
}

#[test]
fn test_validate_rejects_unpinned_must_apply_repo() {
    let config = configs::PINNED.replace(", branch: master, ref: abc1234", ", branch: master");
    let fixture = TestFixture::new().with_config(&config);

    fixture
        .command()
        .arg("validate")
        .assert()
        .failure()
        .stdout(predicate::str::contains("Configuration parsing failed"))
        .stderr(predicate::str::contains("must_apply.recipe_repo.ref must be set"));
}

#[test]
fn test_validate_rejects_disallowed_override() {
    let config = configs::PINNED.replace("_use_llvm_lto: thin", "pkgdesc: evil");
    let fixture = TestFixture::new().with_config(&config);

    fixture
        .command()
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("pkgdesc may not be overridden"));
}

#[test]
fn test_validate_checks_template_placeholders() {
    let config = format!("{}  template: PKGBUILD.in\n", configs::PINNED);
    let fixture = TestFixture::new().with_config(&config);
    fixture
        .child("PKGBUILD.in")
        .write_str("pkgver={pkgver}\nsource=({sources_block})\n")
        .unwrap();

    fixture
        .command()
        .arg("validate")
        .assert()
        .failure()
        .stdout(predicate::str::contains("Template processing error"));
}

#[test]
fn test_validate_accepts_complete_template() {
    let config = format!("{}  template: PKGBUILD.in\n", configs::PINNED);
    let fixture = TestFixture::new().with_config(&config);
    fixture
        .child("PKGBUILD.in")
        .write_str(
            "pkgver={pkgver}\n_srcname={srcname}\nsource=({sources_block})\nsha256sums=({sha256sums_block})\n",
        )
        .unwrap();

    fixture
        .command()
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Template is usable"));
}
