use super::{real_dispatcher, run, tool_available};
use crate::tests::fixtures::{code_samples::JS_HELLO, test_scenarios::*};
use crate::ExecutionRequest;

#[tokio::test]
async fn test_javascript_basic() {
    if !tool_available("node") {
        return;
    }
    let result = run(&real_dispatcher(), "javascript", JS_HELLO).await;
    assert!(result.success, "{:?}", result);
    assert_eq!(result.stdout, "hi\n2");
    assert_eq!(result.stderr, "");
    assert_eq!(result.exit_code, 0);
}

#[tokio::test]
async fn test_javascript_uncaught_exception() {
    if !tool_available("node") {
        return;
    }
    let result = run(&real_dispatcher(), "js", JS_THROWS).await;
    assert!(!result.success);
    assert_eq!(result.exit_code, 1);
    assert_eq!(result.stdout, "before");
    assert!(result.stderr.starts_with("TypeError: bad input"), "{}", result.stderr);
}

#[tokio::test]
async fn test_javascript_syntax_error_is_captured() {
    if !tool_available("node") {
        return;
    }
    let result = run(&real_dispatcher(), "javascript", JS_SYNTAX_ERROR).await;
    assert!(!result.success);
    assert!(result.stderr.starts_with("SyntaxError"), "{}", result.stderr);
}

#[tokio::test]
async fn test_javascript_has_no_host_globals() {
    if !tool_available("node") {
        return;
    }
    let dispatcher = real_dispatcher();
    let result = run(&dispatcher, "javascript", JS_HOST_ACCESS).await;
    assert_eq!(result.stdout, "undefined undefined undefined");

    let result = run(&dispatcher, "javascript", JS_CONSTRUCTOR_CHAIN).await;
    assert!(result.success, "{:?}", result);
    assert_eq!(result.stdout, "undefined undefined");
}

#[tokio::test]
async fn test_javascript_microtask_output_is_kept() {
    if !tool_available("node") {
        return;
    }
    let result = run(&real_dispatcher(), "javascript", JS_MICROTASKS).await;
    assert!(result.success, "{:?}", result);
    assert_eq!(result.stdout, "now\nlater");
}

#[tokio::test]
async fn test_javascript_renders_values_deterministically() {
    if !tool_available("node") {
        return;
    }
    let result = run(&real_dispatcher(), "javascript", JS_STRUCTURED_VALUES).await;
    assert_eq!(
        result.stdout,
        r#"{"a":[1,"x",null,undefined],"b":2,"self":[Circular]} 10n [Function: named]"#
    );
}

#[tokio::test]
async fn test_javascript_stdin() {
    if !tool_available("node") {
        return;
    }
    let result = real_dispatcher()
        .execute(ExecutionRequest::new("javascript", JS_READS_STDIN).with_stdin("3\n4"))
        .await;
    assert_eq!(result.stdout, "7");
}

#[tokio::test]
async fn test_javascript_timeout() {
    if !tool_available("node") {
        return;
    }
    let result = real_dispatcher()
        .execute(ExecutionRequest::new("javascript", JS_INFINITE_LOOP).with_time_limit(500))
        .await;
    assert!(!result.success);
    assert_eq!(result.stderr, "Execution timed out after 500ms");
}
