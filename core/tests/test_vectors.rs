//! Verify document mapping, request building, and error parsing against JSON
//! test vectors stored in `test-vectors/`.
//!
//! Comparing parsed JSON (not raw strings) avoids false negatives from
//! field-ordering differences.

use chrono::{DateTime, Utc};
use serde_json::Value;
use task_sync_core::{
    DocumentClient, Fields, HttpMethod, HttpRequest, HttpResponse, StoreError, Task, TaskOrder,
};

fn parse_method(s: &str) -> HttpMethod {
    match s {
        "GET" => HttpMethod::Get,
        "POST" => HttpMethod::Post,
        "PUT" => HttpMethod::Put,
        "PATCH" => HttpMethod::Patch,
        "DELETE" => HttpMethod::Delete,
        other => panic!("unknown method: {other}"),
    }
}

fn str_of<'a>(case: &'a Value, key: &str) -> &'a str {
    case[key].as_str().unwrap_or_else(|| panic!("missing {key}"))
}

// ---------------------------------------------------------------------------
// Document → Task
// ---------------------------------------------------------------------------

#[test]
fn task_mapping_vectors() {
    let raw = include_str!("../../test-vectors/tasks.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();
    let now: DateTime<Utc> = str_of(&vectors, "now").parse().unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = str_of(case, "name");
        let doc = serde_json::from_value(case["document"].clone()).unwrap();
        let expected: Task = serde_json::from_value(case["expected"].clone()).unwrap();

        let task = Task::from_document(&doc, now);
        assert_eq!(task, expected, "{name}");
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

fn build(client: &DocumentClient, case: &Value) -> HttpRequest {
    let collection = str_of(case, "collection");
    let fields = || -> Fields { case["fields"].as_object().cloned().unwrap() };
    let order = || -> TaskOrder { str_of(case, "order").parse().unwrap() };

    match str_of(case, "operation") {
        "list" => client.build_list_documents(collection, &order().query()),
        "listen" => client.build_listen(collection, &order().query()),
        "create" => client.build_create_document(collection, &fields()).unwrap(),
        "update" => client
            .build_update_document(collection, str_of(case, "id"), &fields())
            .unwrap(),
        "delete" => client.build_delete_document(collection, str_of(case, "id")),
        other => panic!("unknown operation: {other}"),
    }
}

#[test]
fn request_vectors() {
    let raw = include_str!("../../test-vectors/requests.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();
    let base_url = str_of(&vectors, "base_url");
    let client = DocumentClient::new(base_url);

    for case in vectors["cases"].as_array().unwrap() {
        let name = str_of(case, "name");
        let expected = &case["expected_request"];
        let req = build(&client, case);

        assert_eq!(req.method, parse_method(str_of(expected, "method")), "{name}: method");
        assert_eq!(req.path, format!("{base_url}{}", str_of(expected, "path")), "{name}: path");

        let expected_headers: Vec<(String, String)> =
            serde_json::from_value(expected["headers"].clone()).unwrap();
        assert_eq!(req.headers, expected_headers, "{name}: headers");

        let body = match req.body.as_deref() {
            Some(body) => serde_json::from_str(body).unwrap(),
            None => Value::Null,
        };
        assert_eq!(body, expected["body"], "{name}: body");
    }
}

// ---------------------------------------------------------------------------
// Error responses
// ---------------------------------------------------------------------------

#[test]
fn error_vectors() {
    let raw = include_str!("../../test-vectors/errors.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();
    let client = DocumentClient::new("http://localhost:3000");

    for case in vectors["cases"].as_array().unwrap() {
        let name = str_of(case, "name");
        let response = HttpResponse {
            status: case["status"].as_u64().unwrap() as u16,
            headers: Vec::new(),
            body: str_of(case, "body").to_string(),
        };
        let expected = &case["expected"];
        let expected = match str_of(expected, "kind") {
            "not-found" => StoreError::NotFound,
            "permission-denied" => StoreError::PermissionDenied(str_of(expected, "message").to_string()),
            "http" => StoreError::HttpError {
                status: expected["status"].as_u64().unwrap() as u16,
                body: str_of(expected, "body").to_string(),
            },
            other => panic!("unknown kind: {other}"),
        };

        let err = client.parse_get_document(response).unwrap_err();
        assert_eq!(err, expected, "{name}");
    }
}
