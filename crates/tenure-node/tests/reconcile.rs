//! End-to-end passes against an in-memory space.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tempfile::TempDir;
use tenure_node::{
    MemberSnapshot, MemorySpace, NodeConfig, NodeContext, PassRunner, RetryPolicy, RoleCall,
};
use tenure_registry::{MemberId, Registry};
use tenure_tiers::{Tier, TierTable};

struct Fixture {
    _dir: TempDir,
    space: Arc<MemorySpace>,
    ctx: Arc<NodeContext>,
    runner: PassRunner,
}

async fn fixture() -> Fixture {
    fixture_in(tempfile::tempdir().unwrap(), NodeConfig::default()).await
}

async fn fixture_in(dir: TempDir, mut config: NodeConfig) -> Fixture {
    config.data_dir = dir.path().to_path_buf();
    config.retry = RetryPolicy::immediate();
    let registry = Arc::new(Registry::open(config.registry_path()).await.unwrap());
    let space = Arc::new(MemorySpace::with_tiers(&TierTable::default(), ["Member", "Moderator"]));
    let ctx = Arc::new(NodeContext::new(registry, space.clone(), config));
    let runner = PassRunner::new(ctx.clone());
    Fixture {
        _dir: dir,
        space,
        ctx,
        runner,
    }
}

fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp(1_600_000_000, 0).unwrap()
}

fn day(n: i64) -> DateTime<Utc> {
    t0() + Duration::days(n)
}

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn tier_labels(held: &BTreeSet<String>) -> Vec<&String> {
    let table = TierTable::default();
    held.iter().filter(|l| table.is_tier_label(l)).collect()
}

#[tokio::test]
async fn promotion_over_time() {
    let f = fixture().await;
    let id = MemberId::from("1");
    f.space
        .insert_member(MemberSnapshot::new("1", "ada").joined(t0()).with_roles(["Member"]));

    f.runner.run_pass_at(day(95)).await.unwrap();
    assert_eq!(f.space.calls(), vec![RoleCall::Add(id.clone(), "3 Month Member".into())]);

    f.runner.run_pass_at(day(200)).await.unwrap();
    assert_eq!(
        f.space.calls()[1..],
        [
            RoleCall::Remove(id.clone(), "3 Month Member".into()),
            RoleCall::Add(id.clone(), "6 Month Member".into()),
        ]
    );
    assert_eq!(f.space.roles_of(&id), set(&["6 Month Member", "Member"]));
}

#[tokio::test]
async fn second_pass_is_silent() {
    let f = fixture().await;
    for (id, age) in [("1", 3), ("2", 400), ("3", 2000)] {
        f.space.insert_member(
            MemberSnapshot::new(id, id)
                .joined(day(-age))
                .with_roles(["Member"]),
        );
    }

    let first = f.runner.run_pass_at(t0()).await.unwrap();
    assert_eq!(first.changed, 3);
    let calls = f.space.calls().len();

    let second = f.runner.run_pass_at(t0()).await.unwrap();
    assert_eq!(second.changed, 0);
    assert_eq!(second.converged, 3);
    assert_eq!(f.space.calls().len(), calls);
}

#[tokio::test]
async fn stale_higher_tier_is_downgraded() {
    let f = fixture().await;
    let id = MemberId::from("1");
    f.space.insert_member(
        MemberSnapshot::new("1", "ada")
            .joined(day(-200))
            .with_roles(["Member", "3 Year Member"]),
    );

    f.runner.run_pass_at(t0()).await.unwrap();
    assert_eq!(f.space.roles_of(&id), set(&["6 Month Member", "Member"]));
}

#[tokio::test]
async fn losing_prerequisite_strips_tier() {
    let f = fixture().await;
    let id = MemberId::from("1");
    f.space.insert_member(
        MemberSnapshot::new("1", "ada")
            .joined(day(-400))
            .with_roles(["1 Year Member", "Moderator"]),
    );

    let mut transitions = f.ctx.subscribe();
    f.runner.run_pass_at(t0()).await.unwrap();
    assert_eq!(f.space.roles_of(&id), set(&["Moderator"]));

    let transition = transitions.try_recv().unwrap();
    assert_eq!(transition.from, Some(Tier::OneYear));
    assert_eq!(transition.to, None);
    assert!(!transition.is_promotion());
}

#[tokio::test]
async fn multiple_tier_labels_collapse_to_one() {
    let f = fixture().await;
    let id = MemberId::from("1");
    f.space.insert_member(
        MemberSnapshot::new("1", "ada")
            .joined(day(-800))
            .with_roles(["Member", "New Member", "1 Year Member", "3 Year Member", "Moderator"]),
    );

    f.runner.run_pass_at(t0()).await.unwrap();
    let held = f.space.roles_of(&id);
    assert_eq!(tier_labels(&held), vec!["2 Year Member"]);
    assert!(held.contains("Moderator"));

    let record = f.ctx.registry.get(&id).await.unwrap();
    assert_eq!(record.role_labels, held);
}

#[tokio::test]
async fn unknown_join_time_leaves_tiers_alone() {
    let config = NodeConfig {
        full_scan: false,
        ..Default::default()
    };
    let f = fixture_in(tempfile::tempdir().unwrap(), config).await;
    f.space.insert_member(
        MemberSnapshot::new("1", "ada").with_roles(["Member", "1 Year Member"]),
    );
    f.space
        .insert_member(MemberSnapshot::new("2", "bo").with_roles(["1 Year Member"]));
    for id in ["1", "2"] {
        let roles = f.space.roles_of(&id.into());
        f.ctx
            .registry
            .upsert(&id.into(), |r| r.set_roles(roles))
            .await;
    }

    let report = f.runner.run_pass_at(t0()).await.unwrap();
    assert_eq!(report.skipped, 1);
    assert!(f.space.roles_of(&"1".into()).contains("1 Year Member"));
    assert!(f.space.roles_of(&"2".into()).is_empty());
}

#[tokio::test]
async fn missing_role_is_skipped_and_rest_applied() {
    let f = fixture().await;
    let id = MemberId::from("1");
    f.space.delete_role("6 Month Member");
    f.space.insert_member(
        MemberSnapshot::new("1", "ada")
            .joined(day(-200))
            .with_roles(["Member", "New Member"]),
    );

    let report = f.runner.run_pass_at(t0()).await.unwrap();
    assert_eq!(report.labels_missing, 1);
    assert_eq!(report.labels_removed, 1);
    assert_eq!(f.space.roles_of(&id), set(&["Member"]));
}

#[tokio::test]
async fn forbidden_space_is_retried_next_pass() {
    let f = fixture().await;
    let id = MemberId::from("1");
    f.space
        .insert_member(MemberSnapshot::new("1", "ada").joined(day(-10)).with_roles(["Member"]));
    f.space.set_forbidden(true);

    let blocked = f.runner.run_pass_at(t0()).await.unwrap();
    assert!(blocked.forbidden);
    assert_eq!(blocked.pending, 1);
    assert!(f.space.calls().is_empty());

    f.space.set_forbidden(false);
    let retried = f.runner.run_pass_at(t0()).await.unwrap();
    assert!(!retried.forbidden);
    assert!(f.space.roles_of(&id).contains("New Member"));
}

#[tokio::test]
async fn outage_skips_member_until_next_pass() {
    let f = fixture().await;
    let id = MemberId::from("1");
    f.space
        .insert_member(MemberSnapshot::new("1", "ada").joined(day(-10)).with_roles(["Member"]));
    f.space
        .insert_member(MemberSnapshot::new("2", "bo").joined(day(-10)).with_roles(["Member"]));

    // Both attempts for the first member fail; the second member is unaffected.
    f.space.fail_mutations(2);
    let report = f.runner.run_pass_at(t0()).await.unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.changed, 1);
    assert!(!f.space.roles_of(&id).contains("New Member"));

    f.runner.run_pass_at(t0()).await.unwrap();
    assert!(f.space.roles_of(&id).contains("New Member"));
}

#[tokio::test]
async fn corrupt_store_is_rebuilt_from_listing() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("members.json"), b"{ not json").unwrap();

    let f = fixture_in(dir, NodeConfig::default()).await;
    assert!(f.ctx.registry.is_empty().await);
    assert!(f.ctx.registry.path().with_extension("json.corrupt").exists());

    f.space
        .insert_member(MemberSnapshot::new("1", "ada").joined(day(-100)).with_roles(["Member"]));
    f.runner.run_pass_at(t0()).await.unwrap();

    let reopened = Registry::open(f.ctx.registry.path()).await.unwrap();
    let record = reopened.get(&"1".into()).await.unwrap();
    assert_eq!(record.joined_at, Some(day(-100)));
    assert!(record.has_label("3 Month Member"));
}

#[tokio::test]
async fn legacy_store_is_read() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("members.json"),
        format!(
            r#"{{"1": {{"join_date": {}.5, "name": "ada", "role": ["Member"]}}}}"#,
            day(-40).timestamp()
        ),
    )
    .unwrap();

    let config = NodeConfig {
        full_scan: false,
        ..Default::default()
    };
    let f = fixture_in(dir, config).await;
    f.space
        .insert_member(MemberSnapshot::new("1", "ada").with_roles(["Member"]));

    let report = f.runner.run_pass_at(t0()).await.unwrap();
    assert_eq!(report.changed, 1);
    assert!(f.space.roles_of(&"1".into()).contains("New Member"));
}

#[tokio::test]
async fn rejoin_restarts_the_clock() {
    let f = fixture().await;
    let id = MemberId::from("1");
    f.space.insert_member(
        MemberSnapshot::new("1", "ada")
            .joined(day(-500))
            .with_roles(["Member"]),
    );
    f.runner.run_pass_at(t0()).await.unwrap();
    assert!(f.space.roles_of(&id).contains("1 Year Member"));

    // Leaves, comes back with a fresh join time and the old labels stripped.
    f.space.remove_member(&id);
    f.runner.run_pass_at(t0()).await.unwrap();
    assert!(f.ctx.registry.get(&id).await.unwrap().is_departed());

    f.space
        .insert_member(MemberSnapshot::new("1", "ada").joined(day(-5)).with_roles(["Member"]));
    f.runner.run_pass_at(t0()).await.unwrap();

    let record = f.ctx.registry.get(&id).await.unwrap();
    assert!(!record.is_departed());
    assert_eq!(record.joined_at, Some(day(-5)));
    assert_eq!(f.space.roles_of(&id), set(&["Member", "New Member"]));
}
