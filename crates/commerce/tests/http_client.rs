//! HttpCommerceClient against a wiremock server: request construction,
//! call-limit tracking, pagination, error mapping and bulk jobs.

use commerce::{BulkJobState, CommerceApi, CommerceApiError, CommerceClientConfig, HttpCommerceClient};
use domain::{Operation, RecordData, ResourceKind};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> HttpCommerceClient {
    HttpCommerceClient::new(CommerceClientConfig::new(server.uri(), "shpat_test")).expect("client builds")
}

fn record(value: serde_json::Value) -> RecordData {
    value.as_object().cloned().unwrap_or_default()
}

#[tokio::test]
async fn create_product_posts_wrapped_payload_and_tracks_quota() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/admin/api/2024-01/products.json"))
        .and(header("X-Shopify-Access-Token", "shpat_test"))
        .and(body_partial_json(json!({"product": {"title": "Widget"}})))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("X-Shopify-Shop-Api-Call-Limit", "12/40")
                .set_body_json(json!({"product": {"id": 632910392, "title": "Widget"}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    assert!(client.rate_limit_status().is_none());

    let created = client
        .execute(&Operation::create(ResourceKind::Product, record(json!({"title": "Widget"}))))
        .await
        .expect("create succeeds");

    assert_eq!(created["id"], 632910392);
    let quota = client.rate_limit_status().expect("quota recorded");
    assert_eq!((quota.used, quota.capacity), (12, 40));
}

#[tokio::test]
async fn throttled_response_keeps_status_and_quota() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/admin/api/2024-01/customers/207119551.json"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("X-Shopify-Shop-Api-Call-Limit", "40/40")
                .set_body_string(r#"{"errors":"Exceeded 2 calls per second for api client."}"#),
        )
        .mount(&server)
        .await;

    let err = client(&server)
        .execute(&Operation::update(
            ResourceKind::Customer,
            "207119551".into(),
            record(json!({"email": "a@example.com"})),
        ))
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(429));
    assert!(matches!(err, CommerceApiError::Api { .. }));
}

#[tokio::test]
async fn unprocessable_entity_is_a_plain_api_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/admin/api/2024-01/orders.json"))
        .respond_with(ResponseTemplate::new(422).set_body_string(r#"{"errors":{"line_items":["can't be blank"]}}"#))
        .mount(&server)
        .await;

    let err = client(&server)
        .execute(&Operation::create(ResourceKind::Order, RecordData::new()))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(422));
    assert!(err.to_string().contains("can't be blank"));
}

#[tokio::test]
async fn list_resources_follows_link_header() {
    let server = MockServer::start().await;
    let next = format!(
        "<{}/admin/api/2024-01/products.json?limit=250&page_info=abc>; rel=\"next\"",
        server.uri()
    );

    Mock::given(method("GET"))
        .and(path("/admin/api/2024-01/products.json"))
        .and(query_param("page_info", "abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"products": [{"id": 3, "sku": "C"}]})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/admin/api/2024-01/products.json"))
        .and(query_param("limit", "250"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Link", next.as_str())
                .set_body_json(json!({"products": [{"id": 1, "sku": "A"}, {"id": 2, "sku": "B"}]})),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let products = client(&server)
        .list_resources(ResourceKind::Product)
        .await
        .expect("list succeeds");

    let skus: Vec<&str> = products.iter().filter_map(|p| p["sku"].as_str()).collect();
    assert_eq!(skus, vec!["A", "B", "C"]);
}

#[tokio::test]
async fn bulk_job_submit_poll_and_cancel() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/admin/api/2024-01/graphql.json"))
        .and(body_partial_json(json!({"variables": {"resource": "products"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"bulkOperationRunImport": {
                "bulkOperation": {"id": "gid://shopify/BulkOperation/720918", "status": "CREATED"},
                "userErrors": []
            }}
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/admin/api/2024-01/graphql.json"))
        .and(body_partial_json(json!({"variables": {"id": "gid://shopify/BulkOperation/720918"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "node": {
                    "id": "gid://shopify/BulkOperation/720918",
                    "status": "RUNNING",
                    "errorCode": null,
                    "objectCount": "57"
                },
                "bulkOperationCancel": {"bulkOperation": {"id": "gid://shopify/BulkOperation/720918", "status": "CANCELING"}, "userErrors": []}
            }
        })))
        .mount(&server)
        .await;

    let client = client(&server);
    let job_id = client
        .submit_bulk_job(ResourceKind::Product, &[record(json!({"title": "Widget"}))])
        .await
        .expect("submit");
    assert_eq!(job_id, "gid://shopify/BulkOperation/720918");

    let status = client.bulk_job_status(&job_id).await.expect("status");
    assert_eq!(status.status, BulkJobState::Running);
    assert_eq!(status.object_count, 57);

    client.cancel_bulk_job(&job_id).await.expect("cancel accepted");
}

#[tokio::test]
async fn bulk_user_errors_are_rejections() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/admin/api/2024-01/graphql.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"bulkOperationRunImport": {
                "bulkOperation": null,
                "userErrors": [{"field": ["jsonl"], "message": "A bulk operation is already in progress"}]
            }}
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .submit_bulk_job(ResourceKind::Customer, &[])
        .await
        .unwrap_err();
    match err {
        CommerceApiError::Rejected { message, .. } => assert!(message.contains("already in progress")),
        other => panic!("unexpected error: {other}"),
    }
}
