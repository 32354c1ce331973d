//! WASM widgets executed end to end through `WidgetExecutor`.
//!
//! Bundles are written in the text format so they need no toolchain.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tempfile::TempDir;
use wicket_core::{InputValue, WidgetInputs};
use wicket_runtime::{ExecutorConfig, RuntimeError, WidgetExecutor};

/// Adds the numeric inputs `a` and `b`.
const ADD_WAT: &str = r#"
(module
  (import "widget" "input_number" (func $input_number (param i32 i32) (result f64)))
  (import "widget" "output_number" (func $output_number (param f64)))
  (memory (export "memory") 1)
  (data (i32.const 0) "ab")
  (func (export "run_widget")
    (call $output_number
      (f64.add
        (call $input_number (i32.const 0) (i32.const 1))
        (call $input_number (i32.const 1) (i32.const 1))))))
"#;

/// Returns the `text` input unchanged.
const ECHO_WAT: &str = r#"
(module
  (import "widget" "input_read" (func $input_read (param i32 i32 i32 i32) (result i32)))
  (import "widget" "output" (func $output (param i32 i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "text")
  (func (export "run_widget")
    (local $n i32)
    (local.set $n
      (call $input_read (i32.const 0) (i32.const 4) (i32.const 1024) (i32.const 60000)))
    (call $output (i32.const 1024) (local.get $n))))
"#;

const NO_RESULTS_WAT: &str = r#"
(module
  (import "widget" "output" (func $output (param i32 i32)))
  (memory (export "memory") 1)
  (data (i32.const 16) "No results found.")
  (func (export "run_widget")
    (call $output (i32.const 16) (i32.const 17))))
"#;

const FAILING_WAT: &str = r#"
(module
  (import "widget" "fail" (func $fail (param i32 i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "division by zero")
  (func (export "run_widget")
    (call $fail (i32.const 0) (i32.const 16))))
"#;

const WRONG_ENTRY_WAT: &str = r#"
(module
  (memory (export "memory") 1)
  (func (export "main")))
"#;

const SPIN_WAT: &str = r#"
(module
  (memory (export "memory") 1)
  (func (export "run_widget")
    (loop $spin (br $spin))))
"#;

/// Counts to 100 million, then outputs the counter.
const COUNT_WAT: &str = r#"
(module
  (import "widget" "output_number" (func $output_number (param f64)))
  (memory (export "memory") 1)
  (func (export "run_widget")
    (local $i i32)
    (loop $count
      (local.set $i (i32.add (local.get $i) (i32.const 1)))
      (br_if $count (i32.lt_u (local.get $i) (i32.const 100000000))))
    (call $output_number (f64.convert_i32_u (local.get $i)))))
"#;

/// `run_widget` that does nothing, as a raw binary module.
const EMPTY_ENTRY_WASM: &[u8] = &[
    0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00, // magic + version
    0x01, 0x04, 0x01, 0x60, 0x00, 0x00, // type: () -> ()
    0x03, 0x02, 0x01, 0x00, // func 0 has type 0
    0x07, 0x0e, 0x01, 0x0a, b'r', b'u', b'n', b'_', b'w', b'i', b'd', b'g', b'e', b't', 0x00,
    0x00, // export "run_widget"
    0x0a, 0x04, 0x01, 0x02, 0x00, 0x0b, // body: end
];

fn executor(work_dir: &TempDir, timeout: Option<Duration>) -> WidgetExecutor {
    WidgetExecutor::new(ExecutorConfig {
        work_dir: work_dir.path().to_path_buf(),
        timeout,
        ..ExecutorConfig::default()
    })
    .unwrap()
}

fn staged_files(dir: &TempDir) -> Vec<String> {
    std::fs::read_dir(dir.path())
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default()
}

#[tokio::test]
async fn adds_numeric_inputs() {
    let tmp = TempDir::new().unwrap();
    let executor = executor(&tmp, None);
    let inputs = WidgetInputs::new().with_text("a", "2").with_text("b", "3");

    let output = executor.execute(ADD_WAT, &inputs).await.unwrap();

    assert_eq!(output, "5");
    assert!(staged_files(&tmp).is_empty());
    assert_eq!(executor.registry().active_count(), 0);
}

#[tokio::test]
async fn fixed_message_is_returned_verbatim() {
    let tmp = TempDir::new().unwrap();
    let executor = executor(&tmp, None);

    let output = executor
        .execute(NO_RESULTS_WAT, &WidgetInputs::new())
        .await
        .unwrap();
    assert_eq!(output, "No results found.");
}

#[tokio::test]
async fn long_text_passes_through_unchanged() {
    let tmp = TempDir::new().unwrap();
    let executor = executor(&tmp, None);
    let image = format!("data:image/png;base64,{}", "iVBORw0KGgo".repeat(500));
    let inputs = WidgetInputs::new().with_text("text", image.clone());

    let output = executor.execute(ECHO_WAT, &inputs).await.unwrap();
    assert_eq!(output, image);
}

#[tokio::test]
async fn file_inputs_are_seen_as_their_path() {
    let tmp = TempDir::new().unwrap();
    let executor = executor(&tmp, None);
    let upload = tmp.path().join("uploads").join("photo.png");
    let mut inputs = WidgetInputs::new();
    inputs.insert("text", InputValue::File(upload.clone()));

    let output = executor.execute(ECHO_WAT, &inputs).await.unwrap();
    assert_eq!(output, upload.to_string_lossy());
}

#[tokio::test]
async fn raised_error_becomes_execution_failure() {
    let tmp = TempDir::new().unwrap();
    let executor = executor(&tmp, None);

    let err = executor
        .execute(FAILING_WAT, &WidgetInputs::new())
        .await
        .unwrap_err();

    match err {
        RuntimeError::ExecutionFailure(message) => assert_eq!(message, "division by zero"),
        other => panic!("expected ExecutionFailure, got {other:?}"),
    }
    assert!(staged_files(&tmp).is_empty());
    assert_eq!(executor.registry().active_count(), 0);
}

#[tokio::test]
async fn non_numeric_input_is_reported() {
    let tmp = TempDir::new().unwrap();
    let executor = executor(&tmp, None);
    let inputs = WidgetInputs::new().with_text("a", "two").with_text("b", "3");

    let err = executor.execute(ADD_WAT, &inputs).await.unwrap_err();
    match err {
        RuntimeError::ExecutionFailure(message) => {
            assert_eq!(message, "input 'a' is not a number: 'two'")
        }
        other => panic!("expected ExecutionFailure, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_entry_point_is_distinguished() {
    let tmp = TempDir::new().unwrap();
    let executor = executor(&tmp, None);

    let err = executor
        .execute(WRONG_ENTRY_WAT, &WidgetInputs::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::MissingEntryPoint(_)), "{err:?}");
    assert!(staged_files(&tmp).is_empty());
}

#[tokio::test]
async fn malformed_module_is_a_load_error_and_leaves_nothing_behind() {
    let tmp = TempDir::new().unwrap();
    let executor = executor(&tmp, None);

    let err = executor
        .execute("(module (func", &WidgetInputs::new())
        .await
        .unwrap_err();

    assert!(matches!(err, RuntimeError::LoadError(_)), "{err:?}");
    assert!(staged_files(&tmp).is_empty());
    assert_eq!(executor.registry().active_count(), 0);
}

#[tokio::test]
async fn base64_binary_bundles_are_decoded() {
    let tmp = TempDir::new().unwrap();
    let executor = executor(&tmp, None);
    let bundle = format!("data:application/wasm;base64,{}", STANDARD.encode(EMPTY_ENTRY_WASM));

    let err = executor
        .execute(&bundle, &WidgetInputs::new())
        .await
        .unwrap_err();

    // The module loads and runs; it just never sets an output.
    match err {
        RuntimeError::ExecutionFailure(message) => {
            assert!(message.contains("without producing output"), "{message}")
        }
        other => panic!("expected ExecutionFailure, got {other:?}"),
    }
}

#[tokio::test]
async fn runaway_widget_times_out() {
    let tmp = TempDir::new().unwrap();
    let timeout = Duration::from_millis(200);
    let executor = executor(&tmp, Some(timeout));

    let started = std::time::Instant::now();
    let err = executor
        .execute(SPIN_WAT, &WidgetInputs::new())
        .await
        .unwrap_err();

    assert!(matches!(err, RuntimeError::Timeout(t) if t == timeout), "{err:?}");
    assert!(started.elapsed() >= timeout, "stopped after {:?}", started.elapsed());
    assert!(staged_files(&tmp).is_empty());
    assert_eq!(executor.registry().active_count(), 0);
}

#[tokio::test]
async fn busy_widget_finishing_inside_the_timeout_succeeds() {
    let tmp = TempDir::new().unwrap();
    let executor = executor(&tmp, Some(Duration::from_secs(30)));

    let output = executor
        .execute(COUNT_WAT, &WidgetInputs::new())
        .await
        .unwrap();

    assert_eq!(output, "100000000");
    assert!(staged_files(&tmp).is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_invocations_of_one_widget_are_independent() {
    let tmp = TempDir::new().unwrap();
    let executor = executor(&tmp, None);
    let first = WidgetInputs::new().with_text("a", "1").with_text("b", "1");
    let second = WidgetInputs::new().with_text("a", "40").with_text("b", "2");

    let (left, right) = tokio::join!(
        executor.execute(ADD_WAT, &first),
        executor.execute(ADD_WAT, &second)
    );

    assert_eq!(left.unwrap(), "2");
    assert_eq!(right.unwrap(), "42");
    assert!(staged_files(&tmp).is_empty());
    assert_eq!(executor.registry().active_count(), 0);
}
