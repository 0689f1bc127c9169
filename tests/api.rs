use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use jsonapi_sdk::{
    resolve, Api, ApiError, ApiMethod, ApiSettings, MemoryStore, MethodBinding, MethodCall,
    MethodHandler, Model, ModelConfig, JSONAPI_CONTENT_TYPE,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const MODEL: &str = r#"{"entities":[
  {"type":"Widget","table":"widgets","doc":"description: Things we sell",
   "columns":[
     {"name":"id","kind":"uuid","primary_key":true},
     {"name":"name","example":"bolt"},
     {"name":"weight","kind":"integer","example":3}],
   "relationships":[{"name":"parts","target":"Part","cardinality":"to_many","foreign_key":"widget_id"}]},
  {"type":"Part","table":"parts",
   "columns":[
     {"name":"id","kind":"uuid","primary_key":true},
     {"name":"label"},
     {"name":"widget_id","kind":"uuid"}],
   "relationships":[{"name":"widget","target":"Widget","cardinality":"to_one","foreign_key":"widget_id"}]},
  {"type":"Node","table":"nodes",
   "columns":[
     {"name":"id","kind":"uuid","primary_key":true},
     {"name":"parent_id","kind":"uuid"}],
   "relationships":[{"name":"children","target":"Node","cardinality":"to_many","foreign_key":"parent_id"}]}
]}"#;

struct CountRows;

#[async_trait]
impl MethodHandler for CountRows {
    async fn invoke(&self, mut call: MethodCall<'_>) -> Result<Value, ApiError> {
        Ok(json!(call.uow.count(call.entity).await?))
    }
}

struct Rename;

#[async_trait]
impl MethodHandler for Rename {
    async fn invoke(&self, mut call: MethodCall<'_>) -> Result<Value, ApiError> {
        let instance = call
            .instance
            .take()
            .ok_or_else(|| ApiError::validation("no instance"))?;
        let name = call.args.get("name").cloned().unwrap_or(Value::Null);
        let id = call.entity.identifier_of(&instance)?;
        let key = call.entity.key_of(&id)?;
        let mut values = serde_json::Map::new();
        values.insert("name".into(), name.clone());
        call.uow.update(call.entity, &key, values).await?;
        Ok(name)
    }
}

struct Explode;

#[async_trait]
impl MethodHandler for Explode {
    async fn invoke(&self, _call: MethodCall<'_>) -> Result<Value, ApiError> {
        Err(ApiError::Internal("disk on fire".into()))
    }
}

fn model() -> Model {
    resolve(&ModelConfig::from_json_str(MODEL).unwrap())
        .unwrap()
        .with_method(
            "Widget",
            ApiMethod::new("count", MethodBinding::Class, Arc::new(CountRows))
                .with_doc("summary: Count widgets\nhttp_methods: [GET, POST]"),
        )
        .unwrap()
        .with_method(
            "Widget",
            ApiMethod::new("rename", MethodBinding::Instance, Arc::new(Rename))
                .with_doc("summary: Rename a widget\nargs:\n  name: nut"),
        )
        .unwrap()
        .with_method(
            "Widget",
            ApiMethod::new("explode", MethodBinding::Class, Arc::new(Explode)),
        )
        .unwrap()
        .with_method(
            "Widget",
            ApiMethod::new("secret", MethodBinding::Class, Arc::new(CountRows)).private(),
        )
        .unwrap()
}

fn exposed(settings: ApiSettings) -> Api {
    let mut api = Api::new(settings, Arc::new(MemoryStore::new()), model());
    api.expose_all("").unwrap();
    api
}

fn app() -> Router {
    exposed(ApiSettings::default()).into_router().unwrap()
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, HeaderMap, Value) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, JSONAPI_CONTENT_TYPE)
        .body(match body {
            Some(b) => Body::from(b.to_string()),
            None => Body::empty(),
        })
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, headers, json)
}

async fn create(app: &Router, type_name: &str, attributes: Value) -> String {
    let (status, _, body) = send(
        app,
        "POST",
        &format!("/api/{}/", type_name),
        Some(json!({ "data": { "type": type_name, "attributes": attributes } })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["data"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn post_creates_object_with_location() {
    let app = app();
    let (status, headers, body) = send(
        &app,
        "POST",
        "/api/Widget/",
        Some(json!({ "data": { "type": "Widget", "attributes": { "name": "bolt", "weight": 3 } } })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["type"], "Widget");
    assert_eq!(body["data"]["attributes"]["name"], "bolt");
    let id = body["data"]["id"].as_str().unwrap();
    let location = headers[header::LOCATION].to_str().unwrap();
    assert_eq!(location, format!("/api/Widget/{}", id));
    assert_eq!(body["data"]["links"]["self"], location);
    assert_eq!(
        body["data"]["relationships"]["parts"]["links"]["related"],
        format!("/api/Widget/{}/parts", id)
    );
    assert_eq!(headers[header::CONTENT_TYPE], JSONAPI_CONTENT_TYPE);
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");

    let (status, _, body) = send(&app, "GET", location, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], id);
    assert_eq!(body["links"]["self"], location);
}

#[tokio::test]
async fn post_validates_type_attributes_and_json() {
    let app = app();
    let (status, _, body) = send(
        &app,
        "POST",
        "/api/Widget/",
        Some(json!({ "data": { "type": "Part", "attributes": {} } })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"][0]["detail"].is_string());

    let (status, _, body) = send(
        &app,
        "POST",
        "/api/Widget/",
        Some(json!({ "data": { "type": "Widget", "attributes": { "colour": "red" } } })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["detail"], "Argument colour not valid for Widget");

    let req = Request::builder()
        .method("POST")
        .uri("/api/Widget/")
        .body(Body::from("{not json"))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(resp.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}

#[tokio::test]
async fn client_supplied_ids_are_validated_and_unique() {
    let app = app();
    let id = "6f1c2a54-3d0b-4c57-9a4e-2f4a1b6c8d90";
    let body = json!({ "data": { "type": "Widget", "id": id, "attributes": { "name": "a" } } });
    let (status, _, created) = send(&app, "POST", "/api/Widget/", Some(body.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["data"]["id"], id);

    let (status, _, _) = send(&app, "POST", "/api/Widget/", Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _, _) = send(
        &app,
        "POST",
        "/api/Widget/",
        Some(json!({ "data": { "type": "Widget", "id": "nope", "attributes": {} } })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unresolved_instance_is_a_validation_error() {
    let app = app();
    let (status, _, body) = send(&app, "GET", "/api/Widget/not-an-id", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["detail"], "Invalid WidgetId");

    let missing = uuid::Uuid::new_v4();
    let (status, _, _) = send(&app, "GET", &format!("/api/Widget/{}", missing), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn collection_paging_and_details() {
    let app = app();
    for name in ["a", "b", "c"] {
        create(&app, "Widget", json!({ "name": name })).await;
    }

    let (status, _, body) = send(&app, "GET", "/api/Widget/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 3);
    assert_eq!(body["meta"]["count"], 3);
    assert_eq!(body["links"]["self"], "/api/Widget/");
    assert!(body["data"][0].get("attributes").is_none());

    let (_, _, body) = send(&app, "GET", "/api/Widget/?limit=1", None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["meta"]["count"], 3);

    let (_, _, body) = send(
        &app,
        "GET",
        "/api/Widget/?details=all&limit=5&page%5Boffset%5D=2",
        None,
    )
    .await;
    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["attributes"]["name"], "c");

    let (status, _, _) = send(&app, "GET", "/api/Widget/?limit=-1", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn patch_updates_and_requires_matching_id() {
    let app = app();
    let id = create(&app, "Widget", json!({ "name": "old", "weight": 1 })).await;
    let url = format!("/api/Widget/{}", id);

    let (status, headers, body) = send(
        &app,
        "PATCH",
        &url,
        Some(json!({ "data": { "type": "Widget", "id": id, "attributes": { "name": "new" } } })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(headers[header::LOCATION].to_str().unwrap(), url);
    assert_eq!(body["data"]["attributes"]["name"], "new");
    assert_eq!(body["data"]["attributes"]["weight"], 1);

    let other = uuid::Uuid::new_v4().to_string();
    let (status, _, _) = send(
        &app,
        "PATCH",
        &url,
        Some(json!({ "data": { "type": "Widget", "id": other, "attributes": { "name": "x" } } })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, _, body) = send(&app, "GET", &url, None).await;
    assert_eq!(body["data"]["attributes"]["name"], "new");
}

#[tokio::test]
async fn delete_removes_object() {
    let app = app();
    let id = create(&app, "Widget", json!({ "name": "gone" })).await;
    let url = format!("/api/Widget/{}", id);

    let (status, headers, body) = send(&app, "DELETE", &url, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");

    let (status, _, _) = send(&app, "GET", &url, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, body) = send(&app, "DELETE", &url, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["errors"][0]["detail"], format!("Widget {} not found", id));
}

#[tokio::test]
async fn relationship_post_collects_per_child_errors() {
    let app = app();
    let widget = create(&app, "Widget", json!({ "name": "w" })).await;
    let p1 = create(&app, "Part", json!({ "label": "p1" })).await;
    let p2 = create(&app, "Part", json!({ "label": "p2" })).await;
    let root = format!("/api/Widget/{}/parts", widget);
    let missing = uuid::Uuid::new_v4().to_string();

    let (status, _, body) = send(
        &app,
        "POST",
        &root,
        Some(json!({ "data": [
            { "type": "Part", "id": p1 },
            { "type": "Part", "id": missing },
        ] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"], json!([{ "id": p1, "type": "Part" }]));
    let errors = body["meta"]["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["detail"], format!("Invalid Part id '{}'", missing));

    let (status, _, body) = send(&app, "GET", &root, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([{ "id": p1, "type": "Part" }]));
    assert_eq!(body["meta"]["count"], 1);

    let (status, _, body) = send(&app, "GET", &format!("{}/{}", root, p1), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["attributes"]["label"], "p1");

    let (status, _, _) = send(&app, "GET", &format!("{}/{}", root, p2), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = send(&app, "DELETE", &format!("{}/{}", root, p1), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _, _) = send(&app, "DELETE", &format!("{}/{}", root, p2), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, _, body) = send(&app, "GET", &root, None).await;
    assert_eq!(body["data"], json!([]));

    let (status, _, body) = send(&app, "GET", "/api/Widget/not-an-id/parts", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["detail"], "Invalid Parent Id");
}

#[tokio::test]
async fn relationship_child_lookup_is_not_found_unless_member() {
    let app = app();
    let widget = create(&app, "Widget", json!({ "name": "w" })).await;
    let root = format!("/api/Widget/{}/parts", widget);

    let missing = uuid::Uuid::new_v4();
    let (status, headers, body) = send(&app, "GET", &format!("{}/{}", root, missing), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["errors"][0]["detail"].is_string());
    assert_eq!(headers[header::CONTENT_TYPE], JSONAPI_CONTENT_TYPE);
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");

    let (status, _, body) = send(&app, "GET", &format!("{}/not-an-id", root), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["detail"], "Invalid PartId");
}

#[tokio::test]
async fn to_one_relationship_links_replaces_and_unlinks() {
    let app = app();
    let w1 = create(&app, "Widget", json!({ "name": "first" })).await;
    let w2 = create(&app, "Widget", json!({ "name": "second" })).await;
    let part = create(&app, "Part", json!({ "label": "p" })).await;
    let root = format!("/api/Part/{}/widget", part);

    let (status, _, body) = send(&app, "GET", &root, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], Value::Null);
    assert_eq!(body["links"]["self"], root);

    let (status, _, body) = send(
        &app,
        "POST",
        &root,
        Some(json!({ "data": { "type": "Widget", "id": w1 } })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"], json!([{ "id": w1, "type": "Widget" }]));
    let (_, _, body) = send(&app, "GET", &root, None).await;
    assert_eq!(body["data"]["id"], w1);
    assert_eq!(body["data"]["attributes"]["name"], "first");
    let (_, _, body) = send(&app, "GET", &format!("/api/Widget/{}/parts", w1), None).await;
    assert_eq!(body["meta"]["count"], 1);

    // a second POST replaces the current target
    let (status, _, _) = send(
        &app,
        "POST",
        &root,
        Some(json!({ "data": { "type": "Widget", "id": w2 } })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let (_, _, body) = send(&app, "GET", &root, None).await;
    assert_eq!(body["data"]["id"], w2);
    let (_, _, body) = send(&app, "GET", &format!("/api/Widget/{}/parts", w1), None).await;
    assert_eq!(body["meta"]["count"], 0);
    let (status, _, _) = send(&app, "GET", &format!("{}/{}", root, w2), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = send(&app, "GET", &format!("{}/{}", root, w1), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, body) = send(
        &app,
        "POST",
        &root,
        Some(json!({ "data": [
            { "type": "Widget", "id": w1 },
            { "type": "Widget", "id": w2 },
        ] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["detail"], "Part.widget holds a single object");
    let (_, _, body) = send(&app, "GET", &root, None).await;
    assert_eq!(body["data"]["id"], w2);

    let w3 = uuid::Uuid::new_v4().to_string();
    let (status, headers, body) = send(
        &app,
        "PATCH",
        &root,
        Some(json!({ "data": { "type": "Widget", "id": w3, "attributes": { "name": "third" } } })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(headers[header::LOCATION].to_str().unwrap(), format!("/api/Widget/{}", w3));
    assert_eq!(body["data"]["attributes"]["name"], "third");
    let (_, _, body) = send(&app, "GET", &format!("/api/Part/{}", part), None).await;
    assert_eq!(body["data"]["attributes"]["widget_id"], w3);

    let (status, _, body) = send(&app, "POST", &root, Some(json!({ "data": null }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"], Value::Null);
    let (_, _, body) = send(&app, "GET", &root, None).await;
    assert_eq!(body["data"], Value::Null);
    let (_, _, body) = send(&app, "GET", &format!("/api/Part/{}", part), None).await;
    assert_eq!(body["data"]["attributes"]["widget_id"], Value::Null);
}

#[tokio::test]
async fn relationship_patch_upserts_child() {
    let app = app();
    let widget = create(&app, "Widget", json!({ "name": "w" })).await;
    let root = format!("/api/Widget/{}/parts", widget);
    let part = uuid::Uuid::new_v4().to_string();

    let (status, headers, body) = send(
        &app,
        "PATCH",
        &root,
        Some(json!({ "data": { "type": "Part", "id": part, "attributes": { "label": "fresh" } } })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(headers[header::LOCATION].to_str().unwrap(), format!("/api/Part/{}", part));
    assert_eq!(body["data"]["attributes"]["label"], "fresh");
    assert_eq!(body["data"]["attributes"]["widget_id"], widget);

    let (_, _, body) = send(&app, "GET", &root, None).await;
    assert_eq!(body["meta"]["count"], 1);
}

#[tokio::test]
async fn methods_are_invoked_through_their_urls() {
    let app = app();
    let id = create(&app, "Widget", json!({ "name": "bolt" })).await;

    let (status, _, body) = send(&app, "GET", "/api/widgets/count", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["result"], 1);

    let (status, _, body) = send(
        &app,
        "POST",
        &format!("/api/widgets/{}/rename", id),
        Some(json!({ "meta": { "method": "rename", "args": { "name": "nut" } } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["result"], "nut");
    let (_, _, body) = send(&app, "GET", &format!("/api/Widget/{}", id), None).await;
    assert_eq!(body["data"]["attributes"]["name"], "nut");

    let (status, _, body) = send(&app, "POST", "/api/widgets/not-an-id/rename", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["detail"], "Invalid ID");

    let (status, _, _) = send(&app, "POST", "/api/widgets/secret", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn failing_method_rolls_back_and_masks_error() {
    let app = app();
    let (status, _, body) = send(&app, "POST", "/api/widgets/explode", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["errors"][0]["detail"], "Unknown Error");

    let verbose = exposed(ApiSettings {
        verbose_errors: true,
        cors_domain: None,
        ..ApiSettings::default()
    })
    .into_router()
    .unwrap();
    let (status, headers, body) = send(&verbose, "POST", "/api/widgets/explode", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["errors"][0]["detail"], "disk on fire");
    assert!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
}

#[tokio::test]
async fn self_referencing_relationship_gets_distinct_child_param() {
    let api = exposed(ApiSettings::default());
    let routes = api.route_table();
    let entry = routes.endpoint("-api.Node.childrenId").unwrap();
    assert_eq!(entry.template, "/api/Node/{NodeId}/children/{NodeId2}");
    assert!(routes.endpoint("-api.Widget").is_some());
    assert!(routes.endpoint("-api.WidgetId").is_some());
    assert!(routes.endpoint("-api.widgets.count").is_some());
    assert!(routes.endpoint("-api.widgets.secret").is_none());

    let app = api.into_router().unwrap();
    let parent = create(&app, "Node", json!({})).await;
    let child = create(&app, "Node", json!({})).await;
    let root = format!("/api/Node/{}/children", parent);
    let (status, _, _) = send(
        &app,
        "POST",
        &root,
        Some(json!({ "data": [{ "type": "Node", "id": child }] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _, body) = send(&app, "GET", &format!("{}/{}", root, child), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["attributes"]["parent_id"], parent);
}

#[tokio::test]
async fn documentation_is_registered_and_served() {
    let api = exposed(ApiSettings::default());
    let reg = api.registry();

    let list = reg.operation("/api/Widget/", jsonapi_sdk::Verb::Get).unwrap();
    let read = reg
        .operation("/api/Widget/{WidgetId}", jsonapi_sdk::Verb::Get)
        .unwrap();
    assert_eq!(list.operation_id, "RetrieveaWidgetobject_0");
    assert_eq!(read.operation_id, "RetrieveaWidgetobject_1");

    let list_params: Vec<_> = list.parameters.iter().map(|p| p.name.as_str()).collect();
    assert!(!list_params.contains(&"WidgetId"));
    assert!(list_params.contains(&"filter[weight]"));
    assert!(list_params.contains(&"fields[Widget]"));
    let read_params: Vec<_> = read.parameters.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(read_params, vec!["WidgetId"]);

    let count = reg
        .operation("/api/widgets/count", jsonapi_sdk::Verb::Get)
        .unwrap();
    assert_eq!(count.summary, "Count widgets");
    assert!(reg
        .operation("/api/widgets/count", jsonapi_sdk::Verb::Post)
        .is_some());

    let app = api.into_router().unwrap();
    let (status, _, doc) = send(&app, "GET", "/api/swagger.json", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"]["/api/Widget/"]["post"]["requestBody"].is_object());
    assert_eq!(doc["tags"][0]["name"], "Widget");
    assert_eq!(doc["tags"][0]["description"], "Things we sell");

    let req = Request::builder()
        .uri("/api/swagger.html")
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let (status, _, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    let (status, _, _) = send(&app, "GET", "/ready", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn exposure_errors_abort_startup() {
    let mut api = exposed(ApiSettings::default());
    assert!(matches!(
        api.expose_object("Widget", ""),
        Err(jsonapi_sdk::ExposeError::DuplicateEndpoint(_))
    ));
    assert!(matches!(
        api.expose_object("Gizmo", ""),
        Err(jsonapi_sdk::ExposeError::UnknownEntity(_))
    ));
    api.expose_object("Widget", "v2").unwrap();
    assert!(api.route_table().endpoint("v2-api.Widget").is_some());

    let mut config = ModelConfig::from_json_str(MODEL).unwrap();
    config.entities[0].doc = Some("summary: [1, 2]".into());
    let mut api = Api::new(
        ApiSettings::default(),
        Arc::new(MemoryStore::new()),
        resolve(&config).unwrap(),
    );
    assert!(matches!(
        api.expose_object("Widget", ""),
        Err(jsonapi_sdk::ExposeError::Doc(_))
    ));
}

#[tokio::test]
async fn rejected_exposure_leaves_documentation_untouched() {
    let mut api = exposed(ApiSettings::default());
    let definitions = api.registry().definitions().len();
    let routes = api.route_table().entries().len();

    assert!(api.expose_object("Widget", "").is_err());
    assert_eq!(api.registry().definitions().len(), definitions);
    assert_eq!(api.route_table().entries().len(), routes);
    let list = api
        .registry()
        .operation("/api/Widget/", jsonapi_sdk::Verb::Get)
        .unwrap();
    assert_eq!(list.operation_id, "RetrieveaWidgetobject_0");

    api.expose_object("Widget", "v2").unwrap();
    assert!(api.route_table().entries().len() > routes);
    api.into_router().unwrap();
}

#[tokio::test]
async fn body_extraction_failures_use_the_error_envelope() {
    let app = exposed(ApiSettings {
        max_body_bytes: 64,
        ..ApiSettings::default()
    })
    .into_router()
    .unwrap();
    let name = "x".repeat(256);
    let (status, headers, body) = send(
        &app,
        "POST",
        "/api/Widget/",
        Some(json!({ "data": { "type": "Widget", "attributes": { "name": name } } })),
    )
    .await;
    assert!(status.is_client_error(), "{}", status);
    assert!(body["errors"][0]["detail"].is_string());
    assert_eq!(headers[header::CONTENT_TYPE], JSONAPI_CONTENT_TYPE);
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");

    let (_, _, body) = send(&app, "GET", "/api/Widget/", None).await;
    assert_eq!(body["meta"]["count"], 0);
}
