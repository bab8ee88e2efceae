//! End-to-end coverage of the testable properties and literal scenarios.

use redpill::config::Config;
use redpill::coordinator::Coordinator;
use redpill::error::RedpillError;
use redpill::executor::BuildContext;
use redpill::recipe::{BuildType, CommandSpec, Commands, Recipe, VersionSource};
use redpill::recipe_store::RecipeStore;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::runtime::Handle;

struct Harness {
    _dir: TempDir,
    prefix: PathBuf,
    receipts_dir: PathBuf,
    working_dir: PathBuf,
}

impl Harness {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let prefix = dir.path().join("prefix");
        let receipts_dir = dir.path().join("receipts");
        let working_dir = dir.path().join("work");
        Self { _dir: dir, prefix, receipts_dir, working_dir }
    }

    fn coordinator(&self, store: RecipeStore) -> Coordinator {
        Coordinator::new(
            Config::new("https://distfiles.example.invalid"),
            self.prefix.clone(),
            self.receipts_dir.clone(),
            self.working_dir.clone(),
            store,
            Handle::current(),
        )
    }
}

/// A `makelike` recipe whose only action is dropping `bin/{name}` into the
/// prefix, for exercising dependency ordering and receipt bookkeeping
/// without needing a real distfile fetch.
fn marker_recipe(requires: Vec<String>) -> Recipe {
    Recipe::new(BuildType::Makelike, VersionSource::Literal("1".to_string()))
        .with_requires(requires)
        .with_commands(Commands::Literal(vec![CommandSpec::Action(Arc::new(
            move |ctx: &BuildContext| {
                std::fs::create_dir_all(ctx.prefix.join("bin"))?;
                std::fs::write(ctx.prefix.join("bin").join(&ctx.package), b"binary")?;
                Ok(())
            },
        ))]))
}

#[tokio::test]
async fn scenario_1_fresh_install_linear_deps_and_idempotent_rerun() {
    let harness = Harness::new();
    let store = RecipeStore::from_recipes(
        vec![
            ("a".to_string(), marker_recipe(vec!["b".to_string()])),
            ("b".to_string(), marker_recipe(vec!["c".to_string()])),
            ("c".to_string(), marker_recipe(vec![])),
        ],
        &harness.receipts_dir,
    )
    .unwrap();

    let coordinator = harness.coordinator(store);
    coordinator.install(&["a".to_string()]).unwrap();

    for pkg in ["a", "b", "c"] {
        assert!(harness.prefix.join("bin").join(pkg).exists());
        assert!(harness.receipts_dir.join(format!("{pkg}-1")).exists());
    }

    let before = std::fs::read_to_string(harness.receipts_dir.join("a-1")).unwrap();

    // Receipt idempotence: rerunning with the same request is a no-op.
    coordinator.install(&["a".to_string()]).unwrap();
    let after = std::fs::read_to_string(harness.receipts_dir.join("a-1")).unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn scenario_2_upgrade_uninstalls_old_version_before_installing_new() {
    let harness = Harness::new();
    std::fs::create_dir_all(&harness.receipts_dir).unwrap();
    std::fs::create_dir_all(harness.prefix.join("lib")).unwrap();
    std::fs::create_dir_all(harness.prefix.join("bin")).unwrap();
    std::fs::write(harness.prefix.join("bin/x"), b"old").unwrap();
    std::fs::write(harness.prefix.join("lib/libx.so"), b"old").unwrap();

    let mut old_receipt = std::collections::BTreeSet::new();
    old_receipt.insert("bin/x".to_string());
    old_receipt.insert("lib/libx.so".to_string());
    redpill::fs_ledger::write_receipt(&harness.receipts_dir, "x-1.0", &old_receipt).unwrap();

    let recipe = Recipe::new(BuildType::Makelike, VersionSource::Literal("2.0".to_string())).with_commands(
        Commands::Literal(vec![CommandSpec::Action(Arc::new(|ctx: &BuildContext| {
            std::fs::create_dir_all(ctx.prefix.join("bin"))?;
            std::fs::write(ctx.prefix.join("bin/x"), b"new")?;
            Ok(())
        }))]),
    );
    let store = RecipeStore::from_recipes(vec![("x".to_string(), recipe)], &harness.receipts_dir).unwrap();

    let coordinator = harness.coordinator(store);
    coordinator.install(&["x".to_string()]).unwrap();

    assert!(!harness.receipts_dir.join("x-1.0").exists());
    assert!(harness.receipts_dir.join("x-2.0").exists());
    assert_eq!(std::fs::read(harness.prefix.join("bin/x")).unwrap(), b"new");
    assert!(!harness.prefix.join("lib/libx.so").exists());
}

#[tokio::test]
async fn scenario_5_concurrent_invocation_fails_fast() {
    let harness = Harness::new();
    let store = RecipeStore::from_recipes(
        vec![("solo".to_string(), marker_recipe(vec![]))],
        &harness.receipts_dir,
    )
    .unwrap();

    let _held = redpill::lock::acquire(&harness.working_dir).unwrap();

    let coordinator = harness.coordinator(store);
    let err = coordinator.install(&["solo".to_string()]).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RedpillError>(),
        Some(RedpillError::FatalConcurrency)
    ));
}

#[tokio::test]
async fn scenario_6_makelike_rebuild_trigger_on_touched_dependency() {
    let harness = Harness::new();
    std::fs::create_dir_all(&harness.receipts_dir).unwrap();
    let src_dir = harness._dir.path().join("src");
    std::fs::create_dir_all(&src_dir).unwrap();
    std::fs::write(src_dir.join("m.c"), b"int main(){}").unwrap();

    let recipe_file = harness._dir.path().join("recipe.toml");
    std::fs::write(
        &recipe_file,
        format!(
            r#"
            [[recipe]]
            name = "m"
            type = "makelike"
            depends = ["{src}/*.c"]
            outputs = ["{out}/build/m"]
            "#,
            src = src_dir.display(),
            out = harness._dir.path().display(),
        ),
    )
    .unwrap();

    let store1 = RecipeStore::load(&[recipe_file.clone()], &harness.receipts_dir).unwrap();
    let version1 = store1.current_version("m").unwrap().to_string();

    // Simulate a prior successful build: drop a receipt under the old
    // version's name and an output newer than the source so the hash is
    // initially stable.
    let mut receipt = std::collections::BTreeSet::new();
    receipt.insert("build/m".to_string());
    redpill::fs_ledger::write_receipt(&harness.receipts_dir, &format!("m-{version1}"), &receipt).unwrap();

    std::fs::create_dir_all(harness._dir.path().join("build")).unwrap();
    std::fs::write(harness._dir.path().join("build/m"), b"compiled").unwrap();

    // Touch the dependency (same content, newer mtime) so its mtime exceeds
    // the output's.
    std::thread::sleep(std::time::Duration::from_millis(20));
    filetime::set_file_mtime(src_dir.join("m.c"), filetime::FileTime::now()).unwrap();

    // Same content hash (the dependency's bytes didn't change), but the
    // staleness check against the now-older output still forces a purge of
    // the prior receipt, so the package is reinstalled on the next pass.
    let store2 = RecipeStore::load(&[recipe_file], &harness.receipts_dir).unwrap();
    let version2 = store2.current_version("m").unwrap().to_string();

    assert_eq!(version1, version2);
    assert!(!harness.receipts_dir.join(format!("m-{version1}")).exists());
}

#[tokio::test]
async fn reconcile_correctness_after_mixed_install_and_stray_file() {
    let harness = Harness::new();
    let store = RecipeStore::from_recipes(
        vec![("a".to_string(), marker_recipe(vec![]))],
        &harness.receipts_dir,
    )
    .unwrap();
    let coordinator = harness.coordinator(store);
    coordinator.install(&["a".to_string()]).unwrap();

    // A stray file with no owning receipt.
    std::fs::write(harness.prefix.join("bin").join("orphan"), b"x").unwrap();
    coordinator.install(&["a".to_string()]).unwrap();

    assert!(harness.prefix.join("bin/a").exists());
    assert!(!harness.prefix.join("bin/orphan").exists());
}

#[tokio::test]
async fn digest_mismatch_never_produces_a_receipt() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pkg-1.0.tar.bz2"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"not-the-right-bytes".to_vec()))
        .mount(&server)
        .await;

    let harness = Harness::new();
    let recipe = Recipe::new(BuildType::Default, VersionSource::Literal("1.0".to_string()))
        .with_hash("0".repeat(64))
        .with_distfile("pkg-1.0.tar.bz2");
    let store = RecipeStore::from_recipes(vec![("pkg".to_string(), recipe)], &harness.receipts_dir).unwrap();

    let coordinator = Coordinator::new(
        Config::new(server.uri()),
        harness.prefix.clone(),
        harness.receipts_dir.clone(),
        harness.working_dir.clone(),
        store,
        Handle::current(),
    );

    let err = coordinator.install(&["pkg".to_string()]).unwrap_err();
    assert!(err.to_string().to_lowercase().contains("hash") || err.to_string().to_lowercase().contains("digest"));
    assert!(!harness.receipts_dir.join("pkg-1.0").exists());
}
