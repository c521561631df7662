use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn cmd() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("patchsmith").unwrap()
}

/// A two-file patch with git preambles, as `git diff` would emit it.
const GIT_PATCH: &str = "\
diff --git a/src/foo.c b/src/foo.c
index 1111111..2222222 100644
--- a/src/foo.c
+++ b/src/foo.c
@@ -1,3 +1,3 @@
 int f(void)
-{ return 0; }
+{ return 1; }
 /* end */
diff --git a/src/new.txt b/src/new.txt
new file mode 100644
index 0000000..e69de29
--- /dev/null
+++ b/src/new.txt
@@ -0,0 +1,2 @@
+alpha
+beta
";

/// Helper: set up a tree the patch applies to and write the patch file.
fn setup_tree() -> tempfile::TempDir {
    let dir = tempdir().unwrap();
    let root = dir.path();
    std::fs::create_dir_all(root.join("src")).unwrap();
    std::fs::write(
        root.join("src/foo.c"),
        "int f(void)\n{ return 0; }\n/* end */\n",
    )
    .unwrap();
    std::fs::write(root.join("fix.patch"), GIT_PATCH).unwrap();
    dir
}

// -----------------------------------------------------------------------
// General CLI tests
// -----------------------------------------------------------------------

#[test]
fn help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("apply"))
        .stdout(predicate::str::contains("stats"))
        .stdout(predicate::str::contains("paths"));
}

#[test]
fn missing_patch_file_reports_error() {
    cmd()
        .args(["stats", "/no/such/file.patch"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("error:"));
}

// -----------------------------------------------------------------------
// apply
// -----------------------------------------------------------------------

#[test]
fn apply_patches_a_tree() {
    let dir = setup_tree();
    let root = dir.path();
    cmd()
        .current_dir(root)
        .args(["apply", "fix.patch"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 files patched"));

    assert_eq!(
        std::fs::read_to_string(root.join("src/foo.c")).unwrap(),
        "int f(void)\n{ return 1; }\n/* end */\n"
    );
    assert_eq!(
        std::fs::read_to_string(root.join("src/new.txt")).unwrap(),
        "alpha\nbeta\n"
    );
}

#[test]
fn apply_conflict_exits_nonzero() {
    let dir = setup_tree();
    let root = dir.path();
    std::fs::write(root.join("src/foo.c"), "completely\ndifferent\ncontent\n").unwrap();
    cmd()
        .current_dir(root)
        .args(["apply", "fix.patch"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("NOT MERGED"));

    let merged = std::fs::read_to_string(root.join("src/foo.c")).unwrap();
    assert!(merged.contains("<<<<<<<"));
    assert!(merged.contains(">>>>>>>"));
}

#[test]
fn apply_with_backup_keeps_original() {
    let dir = setup_tree();
    let root = dir.path();
    cmd()
        .current_dir(root)
        .args(["apply", "fix.patch", "--backup", ".orig"])
        .assert()
        .success();
    assert_eq!(
        std::fs::read_to_string(root.join("src/foo.c.orig")).unwrap(),
        "int f(void)\n{ return 0; }\n/* end */\n"
    );
}

#[test]
fn apply_honours_explicit_strip_and_root() {
    let dir = setup_tree();
    let root = dir.path();
    // With -p0 the paths keep their a/, b/ prefixes; aim at a scratch
    // root so the creation lands under b/.
    cmd()
        .current_dir(root)
        .args(["apply", "fix.patch", "-p", "0", "--root", "scratch"])
        .assert()
        .code(1); // foo.c is missing under scratch/, so its hunk cannot apply
    assert!(root.join("scratch/b/src/new.txt").is_file());
}

// -----------------------------------------------------------------------
// stats
// -----------------------------------------------------------------------

#[test]
fn stats_plain_reports_totals() {
    let dir = setup_tree();
    cmd()
        .current_dir(dir.path())
        .args(["stats", "fix.patch"])
        .assert()
        .success()
        .stdout(predicate::str::contains("src/foo.c"))
        .stdout(predicate::str::contains("2 files changed"))
        .stdout(predicate::str::contains("3 insertions(+), 1 deletion(-)"));
}

#[test]
fn stats_json_is_machine_readable() {
    let dir = setup_tree();
    let output = cmd()
        .current_dir(dir.path())
        .args(["stats", "fix.patch", "--format", "json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(value["files"].as_array().unwrap().len(), 2);
    assert_eq!(value["total"]["inserted"], 3);
    assert_eq!(value["total"]["deleted"], 1);
}

// -----------------------------------------------------------------------
// paths
// -----------------------------------------------------------------------

#[test]
fn paths_lists_status_markers() {
    let dir = setup_tree();
    cmd()
        .current_dir(dir.path())
        .args(["paths", "fix.patch"])
        .assert()
        .success()
        .stdout(predicate::str::contains("  src/foo.c"))
        .stdout(predicate::str::contains("+ src/new.txt"));
}

#[test]
fn paths_json_includes_status() {
    let dir = setup_tree();
    let output = cmd()
        .current_dir(dir.path())
        .args(["paths", "fix.patch", "--format", "json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
    let files = value["files"].as_array().unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0]["path"], "src/foo.c");
    assert_eq!(files[1]["status"], "Added");
}
