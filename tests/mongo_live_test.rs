//! Runs against a real MongoDB started with `--auth` and a root user `admin`/`admin`.
//!
//! `SCHEDULEDB_TEST_MONGODB_URI=mongodb://localhost:27017 cargo test -- --ignored`

use scheduledb_db::MongoAdmin;
use scheduledb_init::verify::{verify, VerifyOptions};
use scheduledb_kernel::settings::{BootstrapSettings, CreateMode, DatabaseSettings};
use scheduledb_kernel::{AdminClient, AdminError};

fn database_settings() -> DatabaseSettings {
    DatabaseSettings {
        uri: std::env::var("SCHEDULEDB_TEST_MONGODB_URI")
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string()),
        connect_timeout_ms: 2000,
        ..DatabaseSettings::default()
    }
}

fn isolated_settings() -> BootstrapSettings {
    let mut settings = BootstrapSettings::default();
    settings.target_database = format!("schedule_db_test_{}", std::process::id());
    settings.app_user.username = format!("user_{}", std::process::id());
    settings
}

#[tokio::test]
#[ignore = "requires a running MongoDB"]
async fn bootstrap_then_verify_against_mongodb() {
    let admin = MongoAdmin::connect(&database_settings()).await.unwrap();
    let settings = isolated_settings();

    let report = scheduledb_init::run(&settings, &admin).await.unwrap();
    assert_eq!(report.applied(), 6);

    let findings = verify(
        &settings,
        &admin,
        VerifyOptions {
            expect_empty: true,
            check_login: true,
        },
    )
    .await
    .unwrap();
    assert!(findings.is_clean(), "{:?}", findings.findings);
}

#[tokio::test]
#[ignore = "requires a running MongoDB"]
async fn strict_rerun_fails_against_mongodb() {
    let admin = MongoAdmin::connect(&database_settings()).await.unwrap();
    let mut settings = isolated_settings();
    settings.target_database.push_str("_strict");
    settings.mode = CreateMode::Strict;

    scheduledb_init::run(&settings, &admin).await.unwrap();
    let err = scheduledb_init::run(&settings, &admin).await.unwrap_err();

    let cause = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<AdminError>());
    assert!(matches!(cause, Some(AdminError::UserExists { .. })));
}

#[tokio::test]
#[ignore = "requires a running MongoDB"]
async fn wrong_admin_password_is_rejected_by_mongodb() {
    let admin = MongoAdmin::connect(&database_settings()).await.unwrap();
    admin.ping().await.unwrap();

    let credential = scheduledb_kernel::Credential::new("admin", "definitely-wrong");
    let err = admin.authenticate("admin", &credential).await.unwrap_err();
    assert!(matches!(err, AdminError::AuthenticationFailed { .. }));
}

#[tokio::test]
#[ignore = "requires a running MongoDB"]
async fn verify_counts_documents_exactly_against_mongodb() {
    use mongodb::bson::{doc, Document};
    use mongodb::options::{ClientOptions, Credential};
    use scheduledb_init::verify::FindingKind;

    let db_settings = database_settings();
    let admin = MongoAdmin::connect(&db_settings).await.unwrap();
    let mut settings = isolated_settings();
    settings.target_database.push_str("_count");
    scheduledb_init::run(&settings, &admin).await.unwrap();

    let mut options = ClientOptions::parse(&db_settings.uri).await.unwrap();
    options.credential = Some(
        Credential::builder()
            .username("admin".to_string())
            .password("admin".to_string())
            .source("admin".to_string())
            .build(),
    );
    let client = mongodb::Client::with_options(options).unwrap();
    client
        .database(&settings.target_database)
        .collection::<Document>("courses")
        .insert_one(doc! { "code": "CS101" })
        .await
        .unwrap();

    assert_eq!(
        admin
            .count_documents(&settings.target_database, "courses")
            .await
            .unwrap(),
        1
    );

    let report = verify(
        &settings,
        &admin,
        VerifyOptions {
            expect_empty: true,
            check_login: false,
        },
    )
    .await
    .unwrap();
    assert!(report.has(FindingKind::NonEmptyCollection));
}
