//! `WidgetService` flows over a real on-disk store.

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;
use wicket_core::{ArtifactStore, Category, FsKvStore, InputMarshaler, RequestPayload, WidgetId};
use wicket_pipeline::{GenerationAdapter, StaticSchemaSource, StubLlmClient};
use wicket_runtime::{ExecutorConfig, WidgetExecutor};
use wicket_server::{ServiceError, WidgetService};

fn python_available() -> bool {
    std::process::Command::new("python3")
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

const PY_ADDER: &str = "def run_widget(inputs):\n    return int(inputs['a']) + int(inputs['b'])\n";

async fn service(tmp: &TempDir, reply: String) -> WidgetService {
    let kv = FsKvStore::new(tmp.path().join("widgets"));
    kv.init().await.unwrap();
    let store = ArtifactStore::open(Arc::new(kv)).await.unwrap();
    let marshaler = InputMarshaler::new(tmp.path().join("uploads"));
    marshaler.init().await.unwrap();
    let executor = WidgetExecutor::new(ExecutorConfig {
        work_dir: tmp.path().join("staging"),
        ..ExecutorConfig::default()
    })
    .unwrap();
    let generator = GenerationAdapter::new(
        Arc::new(StubLlmClient::constant(&reply)),
        "database/widgets.db",
        1024,
    );
    WidgetService::new(
        store,
        marshaler,
        executor,
        generator,
        Arc::new(StaticSchemaSource("CREATE TABLE members (id INTEGER)".into())),
    )
}

fn adder_reply() -> String {
    json!({
        "name": "Adder",
        "category": "numerical",
        "python_code": PY_ADDER,
        "html_code": "<input name=\"a\"><input name=\"b\"><button type=\"submit\">Run</button>",
    })
    .to_string()
}

#[tokio::test]
async fn python_adder_scenario() {
    if !python_available() {
        eprintln!("skipping: python3 not found");
        return;
    }
    let tmp = TempDir::new().unwrap();
    let service = service(&tmp, adder_reply()).await;

    let widget = service.create("add a and b").await.unwrap();
    assert_eq!(widget.category, Category::Numerical);
    assert_eq!(widget.usage_count, 0);
    assert_eq!(service.get(widget.id).await.unwrap(), widget);

    let payload = RequestPayload::new().with_field("a", "2").with_field("b", "3");
    let output = service.execute(widget.id, payload).await.unwrap();
    assert_eq!(output, "5");
    assert_eq!(service.get(widget.id).await.unwrap().usage_count, 1);
}

#[tokio::test]
async fn python_widget_reads_uploaded_file() {
    if !python_available() {
        eprintln!("skipping: python3 not found");
        return;
    }
    let tmp = TempDir::new().unwrap();
    let code = "def run_widget(inputs):\n    with open(inputs['user_image'], 'rb') as fh:\n        return len(fh.read())\n";
    let reply = json!({
        "name": "Byte counter",
        "category": "image",
        "code": code,
        "presentation": "<input type=\"file\" name=\"user_image\" required><button type=\"submit\">Run</button>",
    })
    .to_string();
    let service = service(&tmp, reply).await;
    let widget = service.create("count bytes").await.unwrap();

    let payload = RequestPayload::new().with_file("user_image", "photo.png", vec![7u8; 1234]);
    let output = service.execute(widget.id, payload).await.unwrap();

    assert_eq!(output, "1234");
    assert!(!tmp.path().join("uploads").join("photo.png").exists());
}

#[tokio::test]
async fn unknown_widget_touches_nothing() {
    let tmp = TempDir::new().unwrap();
    let service = service(&tmp, adder_reply()).await;

    let payload = RequestPayload::new().with_file("user_image", "photo.png", b"bytes".to_vec());
    let err = service.execute(WidgetId(1), payload).await.unwrap_err();

    assert!(matches!(err, ServiceError::NotFound(WidgetId(1))));
    assert_eq!(std::fs::read_dir(tmp.path().join("uploads")).unwrap().count(), 0);
    assert_eq!(std::fs::read_dir(tmp.path().join("widgets")).unwrap().count(), 0);
    assert!(!tmp.path().join("staging").exists());
}

#[tokio::test]
async fn widgets_survive_a_restart() {
    let tmp = TempDir::new().unwrap();
    let first = service(&tmp, adder_reply()).await;
    let created = first.create("add").await.unwrap();
    drop(first);

    let second = service(&tmp, adder_reply()).await;
    let listed = second.list().await.unwrap();
    assert_eq!(listed, vec![created.clone()]);

    let newer = second.create("add again").await.unwrap();
    assert!(newer.id.as_u64() > created.id.as_u64());
}

#[tokio::test]
async fn invalid_upload_name_is_rejected_before_running() {
    let tmp = TempDir::new().unwrap();
    let service = service(&tmp, adder_reply()).await;
    let widget = service.create("add").await.unwrap();

    let payload = RequestPayload::new()
        .with_file("first", "ok.txt", b"fine".to_vec())
        .with_file("second", "..", b"nope".to_vec());
    let err = service.execute(widget.id, payload).await.unwrap_err();

    assert!(matches!(err, ServiceError::Marshal(wicket_core::MarshalError::Validation(_))));
    assert_eq!(std::fs::read_dir(tmp.path().join("uploads")).unwrap().count(), 0);
    assert_eq!(service.get(widget.id).await.unwrap().usage_count, 0);
}
