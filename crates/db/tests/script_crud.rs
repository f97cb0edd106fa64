//! Integration tests for the scripts repository.

use runforge_db::models::build::CreateBuild;
use runforge_db::models::script::CreateScript;
use runforge_db::repositories::{BuildRepo, ScriptRepo};
use sqlx::PgPool;

fn dto(name: &str) -> CreateScript {
    CreateScript {
        name: name.to_string(),
        filename: format!("{name}.sh"),
        description: String::new(),
        webhook_token: Some(format!("token-{name}")),
    }
}

#[sqlx::test]
async fn create_and_find_script(pool: PgPool) {
    let created = ScriptRepo::create(&pool, &dto("backup")).await.unwrap();
    assert_eq!(created.name, "backup");
    assert_eq!(created.filename, "backup.sh");
    assert!(!created.schedule_enabled);
    assert!(created.schedule_cron.is_none());

    let found = ScriptRepo::find_by_id(&pool, created.id)
        .await
        .unwrap()
        .expect("script should exist");
    assert_eq!(found.id, created.id);
    assert_eq!(found.webhook_token.as_deref(), Some("token-backup"));
}

#[sqlx::test]
async fn duplicate_name_is_rejected(pool: PgPool) {
    ScriptRepo::create(&pool, &dto("dup")).await.unwrap();

    let mut second = dto("dup");
    second.filename = "other.sh".to_string();
    second.webhook_token = Some("token-other".to_string());
    let err = ScriptRepo::create(&pool, &second).await.unwrap_err();

    match err {
        sqlx::Error::Database(db_err) => {
            assert_eq!(db_err.code().as_deref(), Some("23505"));
        }
        other => panic!("expected a unique violation, got {other:?}"),
    }
}

#[sqlx::test]
async fn find_by_filename_and_token(pool: PgPool) {
    let created = ScriptRepo::create(&pool, &dto("deploy")).await.unwrap();

    let by_file = ScriptRepo::find_by_filename(&pool, "deploy.sh")
        .await
        .unwrap()
        .expect("lookup by filename");
    assert_eq!(by_file.id, created.id);

    let by_token = ScriptRepo::find_by_webhook_token(&pool, "token-deploy")
        .await
        .unwrap()
        .expect("lookup by token");
    assert_eq!(by_token.id, created.id);

    assert!(ScriptRepo::find_by_webhook_token(&pool, "nope")
        .await
        .unwrap()
        .is_none());
}

#[sqlx::test]
async fn list_all_is_ordered_by_name(pool: PgPool) {
    ScriptRepo::create(&pool, &dto("zeta")).await.unwrap();
    ScriptRepo::create(&pool, &dto("alpha")).await.unwrap();

    let all = ScriptRepo::list_all(&pool).await.unwrap();
    let names: Vec<_> = all.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["alpha", "zeta"]);
}

#[sqlx::test]
async fn update_schedule_roundtrip(pool: PgPool) {
    let script = ScriptRepo::create(&pool, &dto("nightly")).await.unwrap();

    let updated = ScriptRepo::update_schedule(&pool, script.id, Some("0 2 * * *"), true)
        .await
        .unwrap();
    assert!(updated);

    let found = ScriptRepo::find_by_id(&pool, script.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.schedule_cron.as_deref(), Some("0 2 * * *"));
    assert!(found.schedule_enabled);

    // Clearing resets both columns.
    ScriptRepo::update_schedule(&pool, script.id, None, false)
        .await
        .unwrap();
    let cleared = ScriptRepo::find_by_id(&pool, script.id)
        .await
        .unwrap()
        .unwrap();
    assert!(cleared.schedule_cron.is_none());
    assert!(!cleared.schedule_enabled);
}

#[sqlx::test]
async fn list_scheduled_filters_enabled_with_cron(pool: PgPool) {
    let on = ScriptRepo::create(&pool, &dto("on")).await.unwrap();
    let off = ScriptRepo::create(&pool, &dto("off")).await.unwrap();
    let no_cron = ScriptRepo::create(&pool, &dto("nocron")).await.unwrap();

    ScriptRepo::update_schedule(&pool, on.id, Some("* * * * *"), true)
        .await
        .unwrap();
    ScriptRepo::update_schedule(&pool, off.id, Some("* * * * *"), false)
        .await
        .unwrap();
    ScriptRepo::update_schedule(&pool, no_cron.id, None, true)
        .await
        .unwrap();

    let scheduled = ScriptRepo::list_scheduled(&pool).await.unwrap();
    assert_eq!(scheduled.len(), 1);
    assert_eq!(scheduled[0].id, on.id);
}

#[sqlx::test]
async fn regenerating_token_invalidates_old_one(pool: PgPool) {
    let script = ScriptRepo::create(&pool, &dto("hooked")).await.unwrap();

    ScriptRepo::update_webhook_token(&pool, script.id, "fresh-token")
        .await
        .unwrap();

    assert!(ScriptRepo::find_by_webhook_token(&pool, "token-hooked")
        .await
        .unwrap()
        .is_none());
    assert!(ScriptRepo::find_by_webhook_token(&pool, "fresh-token")
        .await
        .unwrap()
        .is_some());
}

#[sqlx::test]
async fn delete_cascades_build_history(pool: PgPool) {
    let script = ScriptRepo::create(&pool, &dto("doomed")).await.unwrap();
    let build = BuildRepo::create(
        &pool,
        &CreateBuild {
            script_id: script.id,
            triggered_by: "manual",
            webhook_payload: None,
        },
    )
    .await
    .unwrap();

    let deleted = ScriptRepo::delete(&pool, script.id).await.unwrap();
    assert!(deleted);

    assert!(ScriptRepo::find_by_id(&pool, script.id)
        .await
        .unwrap()
        .is_none());
    assert!(BuildRepo::find_by_id(&pool, build.id)
        .await
        .unwrap()
        .is_none());
}
