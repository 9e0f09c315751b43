// Repository behaviour against a scripted backend
// Covers the list fast path, refresh, layered detail lookup and failure policy


use brewery::cache::Lookup;
use brewery::error::{BreweryError, ErrorKind};
use brewery::package::{Dependency, PackageStatus};
use brewery::repository::{BACKEND_NAMESPACE, REPOSITORY_NAMESPACE, list_key, map_key};
use brewery::{Package, PackageKind};
use std::time::Duration;
use test_helpers::{MockBackend, TestEnvironment, cask, formula};

fn names(packages: &[Package]) -> Vec<&str> {
    packages.iter().map(|p| p.name.as_str()).collect()
}

#[tokio::test]
async fn test_single_formula_listing() {
    let env = TestEnvironment::new();
    let backend = MockBackend::new().with_installed(vec![formula("foo", "1.0")]);
    let repo = env.repository(backend.clone());

    let packages = repo.get_all_installed(Some(PackageKind::Formula)).await.unwrap();

    assert_eq!(packages.len(), 1);
    assert_eq!(packages[0].name, "foo");
    assert_eq!(packages[0].status, PackageStatus::NONE);
    assert_eq!(packages[0].versions, vec!["1.0"]);
    assert_eq!(backend.list_calls(PackageKind::Formula), 1);
    assert_eq!(backend.list_calls(PackageKind::Cask), 0);
}

#[tokio::test]
async fn test_listing_is_sorted_by_kind_then_name() {
    let env = TestEnvironment::new();
    let backend = MockBackend::new().with_installed(vec![
        cask("Zed", "0.1"),
        formula("wget", "1.25.0"),
        cask("alacritty", "0.13"),
        formula("Bat", "0.24"),
    ]);
    let repo = env.repository(backend);

    let packages = repo.get_all_installed(None).await.unwrap();
    assert_eq!(names(&packages), vec!["Bat", "wget", "alacritty", "Zed"]);
}

#[tokio::test]
async fn test_second_listing_is_a_cache_hit() {
    let env = TestEnvironment::new();
    let backend = MockBackend::new().with_installed(vec![
        formula("wget", "1.25.0"),
        formula("jq", "1.7.1"),
        cask("firefox", "126.0"),
    ]);
    let repo = env.repository(backend.clone());

    let first = repo.get_all_installed(None).await.unwrap();
    let calls = backend.total_list_calls();
    env.clock.advance(Duration::from_secs(30));
    let second = repo.get_all_installed(None).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(backend.total_list_calls(), calls);
}

#[tokio::test]
async fn test_cached_listing_survives_backend_outage() {
    let env = TestEnvironment::new();
    let backend = MockBackend::new().with_installed(vec![formula("foo", "1.0"), cask("bar", "2.0")]);
    let repo = env.repository(backend.clone());
    let seeded = repo.get_all_installed(None).await.unwrap();

    backend.fail_all(true);
    let calls = backend.total_list_calls();
    let served = repo.get_all_installed(None).await.unwrap();

    assert_eq!(served, seeded);
    assert_eq!(backend.total_list_calls(), calls);
}

#[tokio::test]
async fn test_install_invalidates_listing() {
    let env = TestEnvironment::new();
    let backend = MockBackend::new().with_installed(vec![formula("foo", "1.0")]);
    let repo = env.repository(backend.clone());
    repo.get_all_installed(Some(PackageKind::Formula)).await.unwrap();

    backend.set_installed(PackageKind::Formula, vec![formula("foo", "1.1")]);
    env.simulate_install(5_000);

    let packages = repo.get_all_installed(Some(PackageKind::Formula)).await.unwrap();
    assert_eq!(packages[0].versions, vec!["1.1"]);
    assert_eq!(backend.list_calls(PackageKind::Formula), 2);
}

#[tokio::test]
async fn test_stale_listing_is_served_but_not_promoted() {
    let env = TestEnvironment::new();
    let backend = MockBackend::new().with_installed(vec![formula("foo", "1.0")]);
    let repo = env.repository(backend.clone());
    repo.get_all_installed(Some(PackageKind::Formula)).await.unwrap();

    // Token changes, then brew breaks: the old backend listing is served
    env.simulate_install(5_000);
    backend.fail_all(true);
    let stale = repo.get_all_installed(Some(PackageKind::Formula)).await.unwrap();
    assert_eq!(names(&stale), vec!["foo"]);
    assert_eq!(stale[0].versions, vec!["1.0"]);

    // The stale answer was not written under the new token
    let key = list_key(Some(PackageKind::Formula));
    assert!(matches!(repo.cache().get::<Vec<Package>>(&key), Lookup::Miss));

    // Once brew recovers the next call sees fresh data
    backend.fail_all(false);
    backend.set_installed(PackageKind::Formula, vec![formula("foo", "1.1")]);
    let fresh = repo.get_all_installed(Some(PackageKind::Formula)).await.unwrap();
    assert_eq!(fresh[0].versions, vec!["1.1"]);
}

#[tokio::test]
async fn test_total_failure_propagates() {
    let env = TestEnvironment::new();
    let backend = MockBackend::new();
    backend.fail_all(true);
    let repo = env.repository(backend);

    let err = repo.get_all_installed(None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transient);
    assert!(matches!(err, BreweryError::Command { .. }));
}

#[tokio::test]
async fn test_partial_failure_returns_survivors_without_caching() {
    let env = TestEnvironment::new();
    let backend = MockBackend::new().with_installed(vec![formula("foo", "1.0"), cask("bar", "2.0")]);
    backend.fail(PackageKind::Cask, true);
    let repo = env.repository(backend.clone());

    let partial = repo.get_all_installed(None).await.unwrap();
    assert_eq!(names(&partial), vec!["foo"]);
    assert!(!env.entry_path(REPOSITORY_NAMESPACE, &list_key(None)).exists());
    assert!(!env.entry_path(REPOSITORY_NAMESPACE, &map_key(None)).exists());

    backend.fail(PackageKind::Cask, false);
    let full = repo.get_all_installed(None).await.unwrap();
    assert_eq!(names(&full), vec!["foo", "bar"]);
}

#[tokio::test]
async fn test_empty_installation_yields_empty_list() {
    let env = TestEnvironment::new();
    let repo = env.repository(MockBackend::new());

    assert!(repo.get_all_installed(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_refresh_writes_lists_and_maps_for_every_scope() {
    let env = TestEnvironment::new();
    let backend = MockBackend::new().with_installed(vec![formula("docker", "27.0"), cask("docker", "4.30")]);
    let repo = env.repository(backend);
    repo.get_all_installed(None).await.unwrap();

    for scope in [None, Some(PackageKind::Formula), Some(PackageKind::Cask)] {
        assert!(env.entry_path(REPOSITORY_NAMESPACE, &list_key(scope)).exists());
        assert!(env.entry_path(REPOSITORY_NAMESPACE, &map_key(scope)).exists());
    }
    assert!(env.entry_path(BACKEND_NAMESPACE, "list_formula").exists());
    assert!(env.entry_path(BACKEND_NAMESPACE, "list_cask").exists());

    let all: std::collections::BTreeMap<String, Package> =
        repo.cache().get(&map_key(None)).into_result().unwrap().unwrap();
    assert!(all.contains_key("formula:docker"));
    assert!(all.contains_key("cask:docker"));
}

#[tokio::test]
async fn test_used_by_is_filled_on_refresh() {
    let env = TestEnvironment::new();
    let mut curl = formula("curl", "8.8.0");
    curl.dependencies.push(Dependency::runtime("openssl@3"));
    let backend = MockBackend::new().with_installed(vec![formula("openssl@3", "3.3.1"), curl]);
    let repo = env.repository(backend);

    let packages = repo.get_all_installed(Some(PackageKind::Formula)).await.unwrap();
    let openssl = packages.iter().find(|p| p.name == "openssl@3").unwrap();
    assert!(openssl.used_by.contains("curl"));
}

#[tokio::test]
async fn test_details_come_from_cache_after_listing() {
    let env = TestEnvironment::new();
    let backend = MockBackend::new().with_installed(vec![formula("foo", "1.0")]);
    let repo = env.repository(backend.clone());
    repo.get_all_installed(None).await.unwrap();
    let calls = backend.total_list_calls();

    let pkg = repo.get_details("foo", PackageKind::Formula).await.unwrap();

    assert_eq!(pkg.name, "foo");
    assert_eq!(backend.total_list_calls(), calls);
    assert_eq!(backend.info_calls(), 0);
}

#[tokio::test]
async fn test_details_fall_back_to_list_when_map_is_corrupted() {
    let env = TestEnvironment::new();
    let backend = MockBackend::new().with_installed(vec![formula("foo", "1.0")]);
    let repo = env.repository(backend.clone());
    repo.get_all_installed(Some(PackageKind::Formula)).await.unwrap();

    std::fs::write(
        env.entry_path(REPOSITORY_NAMESPACE, &map_key(Some(PackageKind::Formula))),
        "{not json",
    )
    .unwrap();

    let pkg = repo.get_details("foo", PackageKind::Formula).await.unwrap();
    assert_eq!(pkg.name, "foo");
    assert_eq!(backend.list_calls(PackageKind::Formula), 1);
}

#[tokio::test]
async fn test_details_skip_unreadable_cache_entries() {
    let env = TestEnvironment::new();
    let backend = MockBackend::new().with_installed(vec![formula("foo", "1.0")]);
    let repo = env.repository(backend.clone());
    repo.get_all_installed(Some(PackageKind::Formula)).await.unwrap();

    // A directory where the map file should be cannot be read
    let map = env.entry_path(REPOSITORY_NAMESPACE, &map_key(Some(PackageKind::Formula)));
    std::fs::remove_file(&map).unwrap();
    std::fs::create_dir_all(&map).unwrap();

    let pkg = repo.get_details("foo", PackageKind::Formula).await.unwrap();
    assert_eq!(pkg.name, "foo");
}

#[tokio::test]
async fn test_details_refresh_when_caches_are_empty() {
    let env = TestEnvironment::new();
    let backend = MockBackend::new().with_installed(vec![cask("firefox", "126.0")]);
    let repo = env.repository(backend.clone());

    let pkg = repo.get_details("firefox", PackageKind::Cask).await.unwrap();

    assert_eq!(pkg.kind, PackageKind::Cask);
    assert_eq!(backend.list_calls(PackageKind::Cask), 1);
    assert_eq!(backend.info_calls(), 0);
}

#[tokio::test]
async fn test_details_query_backend_for_uninstalled_packages() {
    let env = TestEnvironment::new();
    let backend = MockBackend::new().with_installed(vec![formula("foo", "1.0")]);
    backend.add_known(formula("ripgrep", "14.1.0"));
    let repo = env.repository(backend.clone());

    let first = repo.get_details("ripgrep", PackageKind::Formula).await.unwrap();
    let second = repo.get_details("ripgrep", PackageKind::Formula).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.latest_version(), Some("14.1.0"));
    // Second lookup is answered by the in-process memo
    assert_eq!(backend.info_calls(), 1);
}

#[tokio::test]
async fn test_unknown_package_is_a_user_error() {
    let env = TestEnvironment::new();
    let repo = env.repository(MockBackend::new().with_installed(vec![formula("foo", "1.0")]));

    let err = repo.get_details("ghost", PackageKind::Formula).await.unwrap_err();

    assert!(matches!(err, BreweryError::PackageNotFound { .. }));
    assert_eq!(err.kind(), ErrorKind::User);
    assert_eq!(err.exit_code(), 1);
    let ctx = err.context();
    assert_eq!(ctx.get("package"), Some("ghost"));
    assert_eq!(ctx.get("kind"), Some("formula"));
}

#[tokio::test]
async fn test_not_found_chains_the_last_failure() {
    let env = TestEnvironment::new();
    let backend = MockBackend::new();
    backend.fail_all(true);
    let repo = env.repository(backend);

    let err = repo.get_details("ghost", PackageKind::Cask).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::User);
    let source = std::error::Error::source(&err).expect("cause is chained");
    assert!(source.to_string().contains("exit code 1"));
}

#[tokio::test]
async fn test_cache_write_failure_is_a_system_error() {
    let env = TestEnvironment::new();
    std::fs::write(env.cache.join(REPOSITORY_NAMESPACE), "not a directory").unwrap();
    let repo = env.repository(MockBackend::new().with_installed(vec![formula("foo", "1.0")]));

    let err = repo.get_all_installed(None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::System);
    assert!(matches!(err, BreweryError::Cache { .. }));
}

#[tokio::test]
async fn test_clear_forgets_everything() {
    let env = TestEnvironment::new();
    let backend = MockBackend::new().with_installed(vec![formula("foo", "1.0")]);
    let repo = env.repository(backend.clone());
    repo.get_all_installed(None).await.unwrap();

    let removed = repo.clear().unwrap();
    assert!(removed >= 2);
    let stats = repo.stats().unwrap();
    assert!(stats.iter().all(|(_, s)| s.entries == 0));

    repo.get_all_installed(None).await.unwrap();
    assert_eq!(backend.list_calls(PackageKind::Formula), 2);
}

#[tokio::test]
async fn test_refresh_queries_backend_within_list_ttl() {
    let env = TestEnvironment::new();
    let backend = MockBackend::new().with_installed(vec![formula("foo", "1.0")]);
    let repo = env.repository(backend.clone());
    repo.get_all_installed(Some(PackageKind::Formula)).await.unwrap();

    backend.set_installed(PackageKind::Formula, vec![formula("foo", "1.1")]);
    env.clock.advance(Duration::from_secs(30));
    let refreshed = repo.refresh(Some(PackageKind::Formula)).await.unwrap();

    assert_eq!(backend.list_calls(PackageKind::Formula), 2);
    assert_eq!(refreshed[0].versions, vec!["1.1"]);
    let cached = repo.get_all_installed(Some(PackageKind::Formula)).await.unwrap();
    assert_eq!(cached[0].versions, vec!["1.1"]);
    assert_eq!(backend.list_calls(PackageKind::Formula), 2);
}

#[tokio::test]
async fn test_refresh_during_outage_serves_last_listing() {
    let env = TestEnvironment::new();
    let backend = MockBackend::new().with_installed(vec![formula("foo", "1.0")]);
    let repo = env.repository(backend.clone());
    repo.get_all_installed(Some(PackageKind::Formula)).await.unwrap();

    backend.fail_all(true);
    let stale = repo.refresh(Some(PackageKind::Formula)).await.unwrap();

    assert_eq!(backend.list_calls(PackageKind::Formula), 2);
    assert_eq!(names(&stale), vec!["foo"]);
    // The repository list written before the outage is still the cached one
    let cached = repo.get_all_installed(Some(PackageKind::Formula)).await.unwrap();
    assert_eq!(names(&cached), vec!["foo"]);
    assert_eq!(backend.list_calls(PackageKind::Formula), 2);
}

#[tokio::test]
async fn test_kind_refresh_counts_cached_dependents_of_other_kind() {
    let env = TestEnvironment::new();
    let mut app = cask("wireshark-app", "4.2.5");
    app.dependencies.push(Dependency::runtime("wireshark"));
    let backend = MockBackend::new().with_installed(vec![formula("wireshark", "4.2.5"), app]);
    let repo = env.repository(backend.clone());

    let all = repo.get_all_installed(None).await.unwrap();
    let from_all = all.iter().find(|p| p.name == "wireshark").unwrap().used_by.clone();
    assert!(from_all.contains("wireshark-app"));

    let formulae = repo.refresh(Some(PackageKind::Formula)).await.unwrap();
    assert_eq!(formulae.len(), 1);
    assert_eq!(formulae[0].used_by, from_all);
    assert_eq!(backend.list_calls(PackageKind::Cask), 1);

    let pkg = repo.get_details("wireshark", PackageKind::Formula).await.unwrap();
    assert_eq!(pkg.used_by, from_all);
}

#[tokio::test]
async fn test_detail_memo_is_dropped_after_install() {
    let env = TestEnvironment::new();
    let backend = MockBackend::new().with_installed(vec![formula("foo", "1.0")]);
    backend.add_known(formula("ripgrep", "14.1.0"));
    let repo = env.repository(backend.clone());

    repo.get_details("ripgrep", PackageKind::Formula).await.unwrap();
    repo.get_details("ripgrep", PackageKind::Formula).await.unwrap();
    assert_eq!(backend.info_calls(), 1);

    backend.add_known(formula("ripgrep", "14.1.1"));
    env.simulate_install(5_000);
    let pkg = repo.get_details("ripgrep", PackageKind::Formula).await.unwrap();

    assert_eq!(backend.info_calls(), 2);
    assert_eq!(pkg.latest_version(), Some("14.1.1"));
}
