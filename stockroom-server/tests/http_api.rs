//! Tests: HTTP API end to end
//!
//! Purpose
//! - Drive the router over a real socket with multipart and JSON bodies.
//! - Check status codes, the record wire shape and the attachment side effects.

mod common;

use common::{harness, spawn_test_server};
use reqwest::multipart::{Form, Part};
use serde_json::Value;

fn record_form(price: &str, quantity: &str, item: &str) -> Form {
    Form::new()
        .text("price", price.to_string())
        .text("quantity", quantity.to_string())
        .text("item", item.to_string())
}

fn file_part(name: &str, contents: &[u8]) -> Part {
    Part::bytes(contents.to_vec()).file_name(name.to_string())
}

#[tokio::test]
async fn root_answers() {
    let h = harness();
    let base = spawn_test_server(&h).await;

    let resp = reqwest::get(format!("{}/", base)).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert!(!resp.text().await.unwrap().is_empty());
}

#[tokio::test]
async fn create_list_and_delete_record() {
    let h = harness();
    let base = spawn_test_server(&h).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/records", base))
        .multipart(record_form("10", "2", "pen"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let created: Value = resp.json().await.unwrap();
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["item"], "pen");
    assert_eq!(created["price"], 10.0);
    assert_eq!(created["quantity"], 2);
    assert!(created["fileName"].is_null());
    assert!(created.get("lastModified").is_some());
    assert!(created.get("fileUrl").is_none());
    assert!(created.get("locator").is_none());

    let listed: Vec<Value> = client
        .get(format!("{}/records", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);

    let resp = client
        .delete(format!("{}/records/{}", base, id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert!(body["message"].as_str().unwrap().contains(&id));

    let listed: Vec<Value> = client
        .get(format!("{}/records", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(listed.iter().all(|r| r["id"] != id.as_str()));
}

#[tokio::test]
async fn create_with_missing_fields_is_rejected() {
    let h = harness();
    let base = spawn_test_server(&h).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/records", base))
        .multipart(Form::new().text("price", "10"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("quantity"));
}

#[tokio::test]
async fn upload_then_download_attachment() {
    let h = harness();
    let base = spawn_test_server(&h).await;
    let client = reqwest::Client::new();

    let form = record_form("3.5", "1", "notebook").part("file", file_part("invoice.pdf", b"%PDF-1.7"));
    let created: Value = client
        .post(format!("{}/records", base))
        .multipart(form)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(created["fileName"], "invoice.pdf");
    let id = created["id"].as_str().unwrap();

    let resp = client
        .post(format!("{}/records/{}/download", base, id))
        .json(&serde_json::json!({ "filename": "invoice.pdf" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()["content-type"].to_str().unwrap(),
        "application/octet-stream"
    );
    assert!(resp.headers()["content-disposition"]
        .to_str()
        .unwrap()
        .contains("invoice.pdf"));
    assert_eq!(resp.bytes().await.unwrap().as_ref(), b"%PDF-1.7");

    let resp = client
        .post(format!("{}/records/{}/download", base, id))
        .json(&serde_json::json!({ "filename": "missing.pdf" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn update_with_deleted_file_name_clears_attachment() {
    let h = harness();
    let base = spawn_test_server(&h).await;
    let client = reqwest::Client::new();

    let created: Value = client
        .post(format!("{}/records", base))
        .multipart(record_form("10", "2", "pen").part("file", file_part("old.png", b"png")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(h.blobs.names().await, vec!["old.png"]);

    let form = record_form("5", "1", "x")
        .text("id", id.clone())
        .text("existingDeletedFileName", "old.png");
    let resp = client
        .put(format!("{}/records", base))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let updated: Value = resp.json().await.unwrap();
    assert_eq!(updated["id"], id.as_str());
    assert_eq!(updated["item"], "x");
    assert!(updated["fileName"].is_null());
    assert!(h.blobs.names().await.is_empty());
}

#[tokio::test]
async fn update_with_foreign_deleted_file_name_is_rejected() {
    let h = harness();
    let base = spawn_test_server(&h).await;
    let client = reqwest::Client::new();

    let created: Value = client
        .post(format!("{}/records", base))
        .multipart(record_form("10", "2", "pen").part("file", file_part("mine.png", b"png")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = created["id"].as_str().unwrap().to_string();

    let form = record_form("5", "1", "x")
        .text("id", id)
        .text("existingDeletedFileName", "theirs.png");
    let resp = client
        .put(format!("{}/records", base))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(h.blobs.names().await, vec!["mine.png"]);
}

#[tokio::test]
async fn update_and_delete_of_unknown_record() {
    let h = harness();
    let base = spawn_test_server(&h).await;
    let client = reqwest::Client::new();
    let unknown = stockroom_core::record::RecordId::generate();

    let resp = client
        .put(format!("{}/records", base))
        .multipart(record_form("1", "1", "x").text("id", unknown.to_string()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = client
        .put(format!("{}/records", base))
        .multipart(record_form("1", "1", "x"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .delete(format!("{}/records/{}", base, unknown))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn events_endpoint_drains_mutations() {
    let h = harness();
    let base = spawn_test_server(&h).await;
    let client = reqwest::Client::new();

    client
        .post(format!("{}/records", base))
        .multipart(record_form("10", "2", "pen"))
        .send()
        .await
        .unwrap();

    let body: Value = client
        .get(format!("{}/events", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["action"], "created");
    assert_eq!(messages[0]["record"]["item"], "pen");

    let body: Value = client
        .get(format!("{}/events", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(body["messages"].as_array().unwrap().is_empty());
}
