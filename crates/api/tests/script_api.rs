//! Integration tests for the script management and manual run endpoints.

mod common;

use axum::http::StatusCode;
use common::{body_json, delete, get, post_json};
use sqlx::PgPool;

#[sqlx::test(migrations = "../db/migrations")]
async fn save_script_creates_row_and_file(pool: PgPool) {
    let dirs = common::TestDirs::new();

    let body = serde_json::json!({
        "name": "greet",
        "content": "#!/bin/sh\necho hello\n",
        "description": "Say hello"
    });
    let app = common::build_test_app(pool.clone(), &dirs);
    let response = post_json(app, "/api/v1/scripts", body).await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    let data = &json["data"];
    assert_eq!(data["name"], "greet");
    assert_eq!(data["filename"], "greet.sh");
    assert_eq!(data["description"], "Say hello");
    assert!(
        data["webhook_token"].is_string(),
        "a webhook token is issued at creation"
    );

    let on_disk = std::fs::read_to_string(dirs.scripts().join("greet.sh")).unwrap();
    assert_eq!(on_disk, "#!/bin/sh\necho hello\n");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn saving_same_filename_updates_in_place(pool: PgPool) {
    let dirs = common::TestDirs::new();

    let app = common::build_test_app(pool.clone(), &dirs);
    let first = post_json(
        app,
        "/api/v1/scripts",
        serde_json::json!({"name": "job", "content": "#!/bin/sh\necho v1\n"}),
    )
    .await;
    assert_eq!(first.status(), StatusCode::CREATED);
    let first_id = body_json(first).await["data"]["id"].as_i64().unwrap();

    let app = common::build_test_app(pool.clone(), &dirs);
    let second = post_json(
        app,
        "/api/v1/scripts",
        serde_json::json!({"name": "job", "content": "#!/bin/sh\necho v2\n"}),
    )
    .await;
    assert_eq!(second.status(), StatusCode::OK);
    let second_id = body_json(second).await["data"]["id"].as_i64().unwrap();

    assert_eq!(first_id, second_id, "same filename must not create a new row");
    let on_disk = std::fs::read_to_string(dirs.scripts().join("job.sh")).unwrap();
    assert_eq!(on_disk, "#!/bin/sh\necho v2\n");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn script_name_with_path_separator_is_rejected(pool: PgPool) {
    let dirs = common::TestDirs::new();
    let app = common::build_test_app(pool, &dirs);

    let response = post_json(
        app,
        "/api/v1/scripts",
        serde_json::json!({"name": "../evil", "content": "boom"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn get_script_returns_metadata_and_content(pool: PgPool) {
    let dirs = common::TestDirs::new();

    let app = common::build_test_app(pool.clone(), &dirs);
    let created = post_json(
        app,
        "/api/v1/scripts",
        serde_json::json!({"name": "show", "content": "#!/bin/sh\necho shown\n"}),
    )
    .await;
    let id = body_json(created).await["data"]["id"].as_i64().unwrap();

    let app = common::build_test_app(pool, &dirs);
    let response = get(app, &format!("/api/v1/scripts/{id}")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["data"]["name"], "show");
    assert_eq!(json["data"]["content"], "#!/bin/sh\necho shown\n");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn unknown_script_is_404(pool: PgPool) {
    let dirs = common::TestDirs::new();

    let app = common::build_test_app(pool.clone(), &dirs);
    let response = get(app, "/api/v1/scripts/9999").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["code"], "NOT_FOUND");

    let app = common::build_test_app(pool, &dirs);
    let response = common::post_empty(app, "/api/v1/scripts/9999/run").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn run_returns_immediately_and_build_succeeds(pool: PgPool) {
    let dirs = common::TestDirs::new();

    let app = common::build_test_app(pool.clone(), &dirs);
    let created = post_json(
        app,
        "/api/v1/scripts",
        serde_json::json!({"name": "runner", "content": "#!/bin/sh\necho line1\necho line2\n"}),
    )
    .await;
    let id = body_json(created).await["data"]["id"].as_i64().unwrap();

    let app = common::build_test_app(pool.clone(), &dirs);
    let response = common::post_empty(app, &format!("/api/v1/scripts/{id}/run")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "started");
    let build_id = json["data"]["build_id"].as_i64().unwrap();

    common::wait_for_terminal(&pool, build_id).await;

    let app = common::build_test_app(pool, &dirs);
    let detail = get(app, &format!("/api/v1/builds/{build_id}")).await;
    let json = body_json(detail).await;
    assert_eq!(json["data"]["status"], "success");
    assert_eq!(json["data"]["exit_code"], 0);
    assert_eq!(json["data"]["triggered_by"], "manual");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn regenerate_webhook_token_replaces_old(pool: PgPool) {
    let dirs = common::TestDirs::new();

    let app = common::build_test_app(pool.clone(), &dirs);
    let created = post_json(
        app,
        "/api/v1/scripts",
        serde_json::json!({"name": "hooked", "content": "#!/bin/sh\n"}),
    )
    .await;
    let json = body_json(created).await;
    let id = json["data"]["id"].as_i64().unwrap();
    let old_token = json["data"]["webhook_token"].as_str().unwrap().to_string();

    let app = common::build_test_app(pool.clone(), &dirs);
    let response =
        common::post_empty(app, &format!("/api/v1/scripts/{id}/webhook/regenerate")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let new_token = body_json(response).await["data"]["webhook_token"]
        .as_str()
        .unwrap()
        .to_string();
    assert_ne!(old_token, new_token);

    // The old token no longer triggers anything.
    let app = common::build_test_app(pool, &dirs);
    let response = post_json(
        app,
        &format!("/webhooks/{old_token}"),
        serde_json::json!({}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn delete_script_removes_row_file_and_history(pool: PgPool) {
    let dirs = common::TestDirs::new();

    let app = common::build_test_app(pool.clone(), &dirs);
    let created = post_json(
        app,
        "/api/v1/scripts",
        serde_json::json!({"name": "doomed", "content": "#!/bin/sh\necho bye\n"}),
    )
    .await;
    let id = body_json(created).await["data"]["id"].as_i64().unwrap();

    // Leave one finished build behind.
    let app = common::build_test_app(pool.clone(), &dirs);
    let run = common::post_empty(app, &format!("/api/v1/scripts/{id}/run")).await;
    let build_id = body_json(run).await["data"]["build_id"].as_i64().unwrap();
    common::wait_for_terminal(&pool, build_id).await;

    let app = common::build_test_app(pool.clone(), &dirs);
    let response = delete(app, &format!("/api/v1/scripts/{id}")).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    assert!(!dirs.scripts().join("doomed.sh").exists());

    let app = common::build_test_app(pool.clone(), &dirs);
    let response = get(app, &format!("/api/v1/scripts/{id}")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Build history cascaded with the script.
    let app = common::build_test_app(pool, &dirs);
    let response = get(app, &format!("/api/v1/builds/{build_id}")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn list_scripts_is_ordered_by_name(pool: PgPool) {
    let dirs = common::TestDirs::new();

    for name in ["zebra", "apple"] {
        let app = common::build_test_app(pool.clone(), &dirs);
        post_json(
            app,
            "/api/v1/scripts",
            serde_json::json!({"name": name, "content": "#!/bin/sh\n"}),
        )
        .await;
    }

    let app = common::build_test_app(pool, &dirs);
    let response = get(app, "/api/v1/scripts").await;
    let json = body_json(response).await;
    let names: Vec<_> = json["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["apple", "zebra"]);
}
