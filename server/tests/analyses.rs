mod common;

use common::{harness, harness_with, Options};
use serde_json::Value;

fn analyses_path(store: &Value) -> String {
    format!("/api/stores/{}/analyses", store["id"].as_str().unwrap())
}

#[tokio::test]
async fn successful_run_charges_and_updates_the_store() {
    let h = harness();
    let token = h.register("owner@example.com").await;
    h.start_trial(&token).await;
    let store = h.add_store(&token, "https://acme.myshopify.com").await;

    let resp = h
        .server
        .post(&analyses_path(&store))
        .authorization_bearer(&token)
        .await;
    assert_eq!(resp.status_code(), 201, "{}", resp.text());
    let analysis: Value = resp.json();
    assert_eq!(analysis["status"], "completed");
    assert_eq!(analysis["overallScore"], 80);
    assert_eq!(analysis["grade"], "B");
    assert_eq!(analysis["categories"].as_array().unwrap().len(), 6);
    assert_eq!(analysis["creditsCharged"], 1);
    assert_eq!(analysis["snapshotTitle"], "Acme Mugs");
    assert_eq!(analysis["provider"], "openai");

    let me = h.me(&token).await;
    assert_eq!(me["credits"], 2);

    let refreshed: Value = h
        .server
        .get(&format!("/api/stores/{}", store["id"].as_str().unwrap()))
        .authorization_bearer(&token)
        .await
        .json();
    assert_eq!(refreshed["lastScore"], 80);
    assert_eq!(refreshed["lastGrade"], "B");
    assert!(refreshed["lastAnalyzedAt"].is_string());

    let ledger: Value = h
        .server
        .get("/api/credits")
        .authorization_bearer(&token)
        .await
        .json();
    assert_eq!(ledger["balance"], 2);
    let entries = ledger["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["reason"], "analysisDebit");
    assert_eq!(entries[0]["reference"], analysis["id"]);
    assert_eq!(entries[1]["reason"], "trialGrant");
}

#[tokio::test]
async fn failed_scrape_refunds_the_run() {
    let h = harness();
    let token = h.register("owner@example.com").await;
    h.start_trial(&token).await;
    let store = h.add_store(&token, "https://broken.myshopify.com").await;

    let resp = h
        .server
        .post(&analyses_path(&store))
        .authorization_bearer(&token)
        .await;
    assert_eq!(resp.status_code(), 502);
    let body: Value = resp.json();
    assert!(body["error"].as_str().unwrap().contains("503"));
    assert_eq!(h.completion.call_count(), 0);

    assert_eq!(h.me(&token).await["credits"], 3);

    let history: Vec<Value> = h
        .server
        .get(&analyses_path(&store))
        .authorization_bearer(&token)
        .await
        .json();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["status"], "failed");
    assert_eq!(history[0]["creditsCharged"], 0);
    assert!(history[0]["error"].is_string());

    let ledger: Value = h
        .server
        .get("/api/credits")
        .authorization_bearer(&token)
        .await
        .json();
    let reasons: Vec<&str> = ledger["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["reason"].as_str().unwrap())
        .collect();
    assert!(reasons.contains(&"analysisDebit"));
    assert!(reasons.contains(&"analysisRefund"));
}

#[tokio::test]
async fn unusable_model_output_refunds_the_run() {
    let h = harness_with(Options {
        completion_reply: "I cannot score this store.".into(),
        ..Options::default()
    });
    let token = h.register("owner@example.com").await;
    h.start_trial(&token).await;
    let store = h.add_store(&token, "https://acme.myshopify.com").await;

    let resp = h
        .server
        .post(&analyses_path(&store))
        .authorization_bearer(&token)
        .await;
    assert_eq!(resp.status_code(), 502);
    assert_eq!(h.me(&token).await["credits"], 3);
}

#[tokio::test]
async fn runs_need_a_plan_and_credits() {
    let h = harness_with(Options {
        extra: vec![("STORESCORE_TRIAL_CREDITS", "1")],
        ..Options::default()
    });
    let token = h.register("owner@example.com").await;
    let store = h.add_store(&token, "https://acme.myshopify.com").await;

    let no_plan = h
        .server
        .post(&analyses_path(&store))
        .authorization_bearer(&token)
        .await;
    assert_eq!(no_plan.status_code(), 402);

    h.start_trial(&token).await;
    let first = h
        .server
        .post(&analyses_path(&store))
        .authorization_bearer(&token)
        .await;
    assert_eq!(first.status_code(), 201);

    let broke = h
        .server
        .post(&analyses_path(&store))
        .authorization_bearer(&token)
        .await;
    assert_eq!(broke.status_code(), 402);
    assert_eq!(h.completion.call_count(), 1);
}

#[tokio::test]
async fn unconfigured_ai_is_unavailable() {
    let h = harness_with(Options {
        ai_configured: false,
        ..Options::default()
    });
    let token = h.register("owner@example.com").await;
    h.start_trial(&token).await;
    let store = h.add_store(&token, "https://acme.myshopify.com").await;

    let resp = h
        .server
        .post(&analyses_path(&store))
        .authorization_bearer(&token)
        .await;
    assert_eq!(resp.status_code(), 503);
    assert_eq!(h.me(&token).await["credits"], 3);
}

#[tokio::test]
async fn analyses_are_listed_fetched_and_deleted() {
    let h = harness();
    let token = h.register("owner@example.com").await;
    let other = h.register("other@example.com").await;
    h.start_trial(&token).await;
    let store = h.add_store(&token, "https://acme.myshopify.com").await;

    let first: Value = h
        .server
        .post(&analyses_path(&store))
        .authorization_bearer(&token)
        .await
        .json();
    let second: Value = h
        .server
        .post(&analyses_path(&store))
        .authorization_bearer(&token)
        .await
        .json();

    let list: Vec<Value> = h
        .server
        .get(&analyses_path(&store))
        .authorization_bearer(&token)
        .await
        .json();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["id"], second["id"]);

    let path = format!("/api/analyses/{}", first["id"].as_str().unwrap());
    assert_eq!(h.server.get(&path).authorization_bearer(&token).await.status_code(), 200);
    assert_eq!(h.server.get(&path).authorization_bearer(&other).await.status_code(), 404);
    assert_eq!(
        h.server
            .get(&analyses_path(&store))
            .authorization_bearer(&other)
            .await
            .status_code(),
        404
    );

    assert_eq!(h.server.delete(&path).authorization_bearer(&token).await.status_code(), 204);
    assert_eq!(h.server.get(&path).authorization_bearer(&token).await.status_code(), 404);

    // Deleting a store takes its history with it.
    h.server
        .delete(&format!("/api/stores/{}", store["id"].as_str().unwrap()))
        .authorization_bearer(&token)
        .await;
    let path = format!("/api/analyses/{}", second["id"].as_str().unwrap());
    assert_eq!(h.server.get(&path).authorization_bearer(&token).await.status_code(), 404);
}
