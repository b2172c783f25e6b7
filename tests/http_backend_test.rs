use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use checkout_widgets::backend::{BackendError, CheckoutBackend, HttpBackend};
use checkout_widgets::lifecycle::WidgetHost;
use checkout_widgets::mock::MockSdk;
use checkout_widgets::model::CaptureOutcome;
use checkout_widgets::telemetry::{
    AttributeValue, ExporterConfig, InMemoryExporter, KeyValue, SpanDataExt, SpanPipeline,
    Telemetry, TelemetryConfig,
};
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use prost::Message;
use checkout_widgets::widget::{Attributes, Element, MemoryElement, WidgetState};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct Shop {
    orders: Arc<Mutex<Vec<Value>>>,
    captures: Arc<Mutex<Vec<String>>>,
    content_types: Arc<Mutex<Vec<String>>>,
}

async fn client_id() -> Json<Value> {
    Json(json!({ "clientid": "abc" }))
}

async fn create_order(State(shop): State<Shop>, headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
    if let Some(content_type) = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
        shop.content_types.lock().unwrap().push(content_type.to_string());
    }
    shop.orders.lock().unwrap().push(body);
    Json(json!({ "id": "ORDER1" }))
}

async fn capture(State(shop): State<Shop>, Path(order_id): Path<String>) -> (StatusCode, Json<Value>) {
    shop.captures.lock().unwrap().push(order_id.clone());
    if order_id == "DECLINED" {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "details": [{ "issue": "INSTRUMENT_DECLINED" }], "debug_id": "d1" })),
        );
    }
    (
        StatusCode::CREATED,
        Json(json!({
            "id": order_id,
            "purchase_units": [{ "payments": { "captures": [{ "id": "TXN1", "status": "COMPLETED" }] } }]
        })),
    )
}

/// Serves `router` on an ephemeral port and returns its base URL.
async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

async fn spawn_shop() -> (Shop, String) {
    let shop = Shop::default();
    let router = Router::new()
        .route("/static/clientid", get(client_id))
        .route("/static/orders", post(create_order))
        .route("/static/capture/{order_id}", post(capture))
        .with_state(shop.clone());
    let base = serve(router).await;
    (shop, format!("{base}/static/index.js"))
}

fn telemetry_with(exporter: &InMemoryExporter, instrumentations: &[&str]) -> Telemetry {
    let config = TelemetryConfig {
        instrumentations: instrumentations.iter().map(|s| s.to_string()).collect(),
        ..TelemetryConfig::default()
    };
    Telemetry::with_exporter(config, exporter.clone())
}

#[tokio::test]
async fn test_checkout_over_http() {
    let (shop, module_url) = spawn_shop().await;
    let exporter = InMemoryExporter::new();
    let telemetry = telemetry_with(&exporter, &["fetch"]);
    let backend = HttpBackend::new(&module_url, telemetry.clone()).unwrap();
    let sdk = MockSdk::new();
    let host = WidgetHost::new(telemetry.clone(), Arc::new(backend), Arc::new(sdk.clone()));

    let page = MemoryElement::new();
    let attributes = Attributes::from([
        ("amount".to_string(), "10.00".to_string()),
        ("currency".to_string(), "USD".to_string()),
    ]);
    let mounted = host.mount("x-paypal", attributes, page.clone()).await.unwrap();
    let widget = mounted.as_checkout().expect("checkout widget");
    assert_eq!(widget.state(), WidgetState::ButtonRendered);
    assert_eq!(sdk.loads()[0].client_id, "abc");

    let (outcome, _) = sdk.checkout().await.unwrap();

    assert_eq!(
        outcome,
        CaptureOutcome::Captured {
            transaction_id: "TXN1".into(),
            status: "COMPLETED".into(),
        }
    );
    assert_eq!(
        shop.orders.lock().unwrap().clone(),
        vec![json!({ "cart": [{
            "id": "YOUR_PRODUCT_ID",
            "quantity": "YOUR_PRODUCT_QUANTITY",
            "amount": "10.00",
            "currency": "USD"
        }]})]
    );
    assert_eq!(shop.content_types.lock().unwrap().clone(), vec!["application/json"]);
    assert_eq!(shop.captures.lock().unwrap().clone(), vec!["ORDER1"]);
    assert_eq!(
        page.child("result-message").unwrap().inner_html(),
        "Transaction COMPLETED: TXN1<br><br>See console for all available details"
    );

    telemetry.force_flush().await.unwrap();
    let gets = exporter.spans_named("HTTP GET");
    assert_eq!(gets.len(), 1);
    assert_eq!(gets[0].attribute("http.method"), Some(&AttributeValue::from("GET")));
    assert_eq!(
        gets[0].attribute("http.url"),
        Some(&AttributeValue::from(module_url.replace("index.js", "clientid")))
    );
    assert_eq!(gets[0].attribute("http.status_code"), Some(&AttributeValue::I64(200)));

    let posts = exporter.spans_named("HTTP POST");
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[1].attribute("http.status_code"), Some(&AttributeValue::I64(201)));
    assert_eq!(telemetry.tracer().open_spans(), 0);

    host.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_error_status_body_is_still_interpreted() {
    let (_shop, module_url) = spawn_shop().await;
    let exporter = InMemoryExporter::new();
    let telemetry = telemetry_with(&exporter, &["fetch"]);
    let backend = HttpBackend::new(&module_url, telemetry.clone()).unwrap();
    let sdk = MockSdk::new();
    let host = WidgetHost::new(telemetry.clone(), Arc::new(backend), Arc::new(sdk.clone()));
    host.mount("x-paypal", Attributes::new(), MemoryElement::new())
        .await
        .unwrap();

    let (outcome, restarts) = sdk.approve("DECLINED").await;

    assert_eq!(outcome, CaptureOutcome::Declined { recoverable: true });
    assert_eq!(restarts, 1);
    assert_eq!(telemetry.meter().counter_value("paypal_errors", &[]), 0);

    telemetry.force_flush().await.unwrap();
    let posts = exporter.spans_named("HTTP POST");
    assert_eq!(posts[0].attribute("http.status_code"), Some(&AttributeValue::I64(422)));
    assert!(posts[0].attribute("error").is_none());
}

#[tokio::test]
async fn test_connection_refused_is_a_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let exporter = InMemoryExporter::new();
    let telemetry = telemetry_with(&exporter, &["fetch"]);
    let backend = HttpBackend::new(&format!("http://{addr}/index.js"), telemetry.clone()).unwrap();

    let err = backend.client_id().await.unwrap_err();
    assert!(matches!(err, BackendError::Network(_)));

    telemetry.force_flush().await.unwrap();
    let spans = exporter.spans_named("HTTP GET");
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].attribute("error"), Some(&AttributeValue::Bool(true)));
    assert!(spans[0].attribute("http.status_code").is_none());
}

#[tokio::test]
async fn test_non_json_body_is_a_decode_error() {
    let router = Router::new().route("/clientid", get(|| async { "<html>maintenance</html>" }));
    let base = serve(router).await;
    let exporter = InMemoryExporter::new();
    let telemetry = telemetry_with(&exporter, &[]);
    let backend = HttpBackend::new(&format!("{base}/index.js"), telemetry.clone()).unwrap();

    let err = backend.client_id().await.unwrap_err();

    assert!(matches!(err, BackendError::Decode(_)));
    telemetry.force_flush().await.unwrap();
    // No instrumentation registered, no HTTP spans.
    assert!(exporter.spans_named("HTTP GET").is_empty());
}

#[tokio::test]
async fn test_spans_reach_otlp_collector() {
    let received: Arc<Mutex<Vec<(String, ExportTraceServiceRequest)>>> = Arc::default();
    let sink = received.clone();
    let router = Router::new().route(
        "/v1/traces",
        post(move |headers: HeaderMap, body: Bytes| {
            let sink = sink.clone();
            async move {
                let content_type = headers
                    .get(header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                match ExportTraceServiceRequest::decode(body) {
                    Ok(request) => {
                        sink.lock().unwrap().push((content_type, request));
                        StatusCode::OK
                    }
                    Err(_) => StatusCode::BAD_REQUEST,
                }
            }
        }),
    );
    let endpoint = serve(router).await;

    let config = TelemetryConfig {
        exporter: ExporterConfig::Otlp { endpoint },
        ..TelemetryConfig::default()
    };
    let telemetry = Telemetry::init(config);
    assert_eq!(telemetry.pipeline(), SpanPipeline::Batch);
    let mut span = telemetry.tracer().start_span("paypal_create_order");
    span.set_attribute(KeyValue::new("paypal.order.id", "ORDER1"));
    span.end();

    assert_eq!(telemetry.force_flush().await.unwrap(), 1);

    let requests = received.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    let (content_type, request) = &requests[0];
    assert_eq!(content_type, "application/x-protobuf");
    let resource_spans = &request.resource_spans[0];
    let exported = &resource_spans.scope_spans[0].spans[0];
    assert_eq!(exported.name, "paypal_create_order");
    assert_eq!(exported.attributes[0].key, "paypal.order.id");
    assert!(resource_spans
        .resource
        .as_ref()
        .unwrap()
        .attributes
        .iter()
        .any(|kv| kv.key == "service.name"));
    telemetry.shutdown().await.unwrap();
}
