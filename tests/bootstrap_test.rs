use scheduledb_db::MemoryAdmin;
use scheduledb_init::verify::{verify, FindingKind, VerifyOptions};
use scheduledb_kernel::settings::{BootstrapSettings, CreateMode};
use scheduledb_kernel::{AdminClient, AdminError, Credential, NewUser, RoleGrant, StepOutcome};

const DB: &str = "schedule_db";

fn fresh_host() -> MemoryAdmin {
    MemoryAdmin::with_root(Credential::new("admin", "admin"))
}

fn admin_error(err: &anyhow::Error) -> Option<&AdminError> {
    err.chain().find_map(|cause| cause.downcast_ref::<AdminError>())
}

#[tokio::test]
async fn first_run_creates_user_and_four_empty_collections() {
    let host = fresh_host();
    let settings = BootstrapSettings::default();

    let report = scheduledb_init::run(&settings, &host).await.unwrap();
    assert_eq!(report.applied(), 6);
    assert_eq!(report.skipped(), 0);

    let user = host.user_info(DB, "user").await.unwrap().unwrap();
    assert_eq!(user.roles, vec![RoleGrant::new("readWrite", DB)]);

    let mut collections = host.list_collections(DB).await.unwrap();
    collections.sort();
    assert_eq!(collections, vec!["classrooms", "courses", "schedules", "users"]);

    for name in &collections {
        assert_eq!(host.list_index_names(DB, name).await.unwrap(), vec!["_id_"]);
        assert_eq!(host.count_documents(DB, name).await.unwrap(), 0);
    }

    let report = verify(
        &settings,
        &host,
        VerifyOptions {
            expect_empty: true,
            check_login: true,
        },
    )
    .await
    .unwrap();
    assert!(report.is_clean(), "{:?}", report.findings);
}

#[tokio::test]
async fn admin_login_uses_default_credential() {
    let host = fresh_host();
    let report = scheduledb_init::run(&BootstrapSettings::default(), &host)
        .await
        .unwrap();
    assert_eq!(report.outcome_of("authenticate"), Some(StepOutcome::Applied));
}

#[tokio::test]
async fn wrong_admin_credential_aborts_before_anything_is_created() {
    let host = fresh_host();
    let mut settings = BootstrapSettings::default();
    settings.admin.password = "not-admin".to_string();

    let err = scheduledb_init::run(&settings, &host).await.unwrap_err();
    assert!(matches!(
        admin_error(&err),
        Some(AdminError::AuthenticationFailed { .. })
    ));

    host.authenticate("admin", &Credential::new("admin", "admin"))
        .await
        .unwrap();
    assert!(host.list_collections(DB).await.unwrap().is_empty());
    assert!(host.user_info(DB, "user").await.unwrap().is_none());
}

#[tokio::test]
async fn skipping_admin_login_works_on_host_without_auth() {
    let host = MemoryAdmin::new();
    let mut settings = BootstrapSettings::default();
    settings.admin.authenticate = false;

    let report = scheduledb_init::run(&settings, &host).await.unwrap();
    assert_eq!(report.steps.len(), 5);
    assert_eq!(report.applied(), 5);
}

#[tokio::test]
async fn skipping_admin_login_on_auth_host_is_refused() {
    let host = fresh_host();
    let mut settings = BootstrapSettings::default();
    settings.admin.authenticate = false;

    let err = scheduledb_init::run(&settings, &host).await.unwrap_err();
    assert!(matches!(admin_error(&err), Some(AdminError::Unauthorized(_))));
}

#[tokio::test]
async fn strict_rerun_surfaces_duplicate_user() {
    let host = fresh_host();
    let mut settings = BootstrapSettings::default();
    settings.mode = CreateMode::Strict;

    scheduledb_init::run(&settings, &host).await.unwrap();

    host.reset_session().await;
    let err = scheduledb_init::run(&settings, &host).await.unwrap_err();
    assert!(err.to_string().contains("create_user"));
    assert!(matches!(admin_error(&err), Some(AdminError::UserExists { .. })));
}

#[tokio::test]
async fn strict_run_surfaces_duplicate_collection() {
    let host = fresh_host();
    host.authenticate("admin", &Credential::new("admin", "admin"))
        .await
        .unwrap();
    host.create_collection(DB, "courses").await.unwrap();
    host.reset_session().await;

    let mut settings = BootstrapSettings::default();
    settings.mode = CreateMode::Strict;

    let err = scheduledb_init::run(&settings, &host).await.unwrap_err();
    assert!(err.to_string().contains("create_collection:courses"));
    assert!(matches!(
        admin_error(&err),
        Some(AdminError::CollectionExists { .. })
    ));
}

#[tokio::test]
async fn ensure_rerun_skips_everything() {
    let host = fresh_host();
    let settings = BootstrapSettings::default();

    scheduledb_init::run(&settings, &host).await.unwrap();
    let report = scheduledb_init::run(&settings, &host).await.unwrap();

    assert_eq!(report.outcome_of("authenticate"), Some(StepOutcome::Applied));
    assert_eq!(report.skipped(), 5);
    assert_eq!(host.list_collections(DB).await.unwrap().len(), 4);
}

#[tokio::test]
async fn ensure_run_leaves_existing_user_with_other_roles_untouched() {
    let host = fresh_host();
    host.authenticate("admin", &Credential::new("admin", "admin"))
        .await
        .unwrap();
    host.create_user(
        DB,
        &NewUser {
            credential: Credential::new("user", "old-secret"),
            roles: vec![RoleGrant::new("read", DB)],
            mechanisms: Vec::new(),
        },
    )
    .await
    .unwrap();
    host.reset_session().await;

    let report = scheduledb_init::run(&BootstrapSettings::default(), &host)
        .await
        .unwrap();
    assert_eq!(report.outcome_of("create_user"), Some(StepOutcome::Skipped));
    assert_eq!(report.applied(), 5);

    let user = host.user_info(DB, "user").await.unwrap().unwrap();
    assert_eq!(user.roles, vec![RoleGrant::new("read", DB)]);

    host.authenticate(DB, &Credential::new("user", "old-secret"))
        .await
        .unwrap();
}

#[tokio::test]
async fn unreachable_host_fails_before_any_step() {
    let host = fresh_host();
    host.set_available(false).await;

    let err = scheduledb_init::run(&BootstrapSettings::default(), &host)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not reachable"));
    assert!(matches!(admin_error(&err), Some(AdminError::Unavailable(_))));
}

#[tokio::test]
async fn invalid_settings_are_rejected_before_connecting() {
    let host = fresh_host();
    host.set_available(false).await;

    let mut settings = BootstrapSettings::default();
    settings.collections.push("users".to_string());

    let err = scheduledb_init::run(&settings, &host).await.unwrap_err();
    assert!(err.to_string().contains("invalid bootstrap settings"));
}

#[tokio::test]
async fn app_user_cannot_reach_other_databases() {
    let host = fresh_host();
    scheduledb_init::run(&BootstrapSettings::default(), &host)
        .await
        .unwrap();

    host.authenticate(DB, &Credential::new("user", "user"))
        .await
        .unwrap();
    host.insert_document(DB, "schedules").await.unwrap();

    let err = host.create_collection("admin", "sneaky").await.unwrap_err();
    assert!(matches!(err, AdminError::Unauthorized(_)));
    let err = host.list_collections("other_db").await.unwrap_err();
    assert!(matches!(err, AdminError::Unauthorized(_)));
}

#[tokio::test]
async fn verify_reports_drift() {
    let host = fresh_host();
    let settings = BootstrapSettings::default();
    scheduledb_init::run(&settings, &host).await.unwrap();

    host.insert_document(DB, "courses").await.unwrap();
    host.insert_document(DB, "audit_log").await.unwrap();
    host.create_index(DB, "users", "email_1").await.unwrap();

    let mut expanded = settings.clone();
    expanded.collections.push("rooms".to_string());

    let report = verify(
        &expanded,
        &host,
        VerifyOptions {
            expect_empty: true,
            check_login: false,
        },
    )
    .await
    .unwrap();

    assert!(report.has(FindingKind::NonEmptyCollection));
    assert!(report.has(FindingKind::UnexpectedCollection));
    assert!(report.has(FindingKind::UnexpectedIndex));
    assert!(report.has(FindingKind::MissingCollection));
    assert!(!report.has(FindingKind::MissingUser));
}

#[tokio::test]
async fn verify_reports_missing_user_and_bad_login() {
    let host = fresh_host();
    let settings = BootstrapSettings::default();

    let report = verify(
        &settings,
        &host,
        VerifyOptions {
            expect_empty: false,
            check_login: true,
        },
    )
    .await
    .unwrap();

    assert!(report.has(FindingKind::MissingUser));
    assert!(report.has(FindingKind::LoginFailed));
    assert_eq!(
        report
            .findings
            .iter()
            .filter(|f| f.kind == FindingKind::MissingCollection)
            .count(),
        4
    );
}
