use super::{real_dispatcher, run, tool_available};
use crate::tests::fixtures::{code_samples::PYTHON_HELLO, test_scenarios::*};
use crate::{BackendReadiness, ExecutionRequest};
use std::sync::Arc;

#[tokio::test]
async fn test_python_basic() {
    if !tool_available("python3") {
        return;
    }
    let dispatcher = real_dispatcher();
    let result = run(&dispatcher, "python", PYTHON_HELLO).await;
    assert!(result.success, "{:?}", result);
    assert_eq!(result.stdout, "Hello from Python!\n");
    assert_eq!(dispatcher.runtime_readiness(), BackendReadiness::Ready);
}

#[tokio::test]
async fn test_python_traceback_hides_worker_frames() {
    if !tool_available("python3") {
        return;
    }
    let result = run(&real_dispatcher(), "py", PYTHON_RAISES).await;
    assert!(!result.success);
    assert_eq!(result.exit_code, 1);
    assert_eq!(result.stdout, "start\n");
    assert!(result.stderr.starts_with("Traceback (most recent call last):"));
    assert!(result.stderr.contains("in f"));
    assert!(result.stderr.trim_end().ends_with("ValueError: boom"));
    assert!(!result.stderr.contains("bootstrap.py"), "{}", result.stderr);
}

#[tokio::test]
async fn test_python_exit_code() {
    if !tool_available("python3") {
        return;
    }
    let result = run(&real_dispatcher(), "python", PYTHON_EXIT_CODE).await;
    assert_eq!(result.exit_code, 3);
    assert!(!result.success);
    assert_eq!(result.stdout, "leaving\n");
}

#[tokio::test]
async fn test_python_streams_are_captured_separately() {
    if !tool_available("python3") {
        return;
    }
    let result = run(&real_dispatcher(), "python", PYTHON_STDERR).await;
    assert!(result.success);
    assert_eq!(result.stdout, "ok\n");
    assert_eq!(result.stderr, "warn\n");
}

#[tokio::test]
async fn test_python_denies_host_access() {
    if !tool_available("python3") {
        return;
    }
    let dispatcher = real_dispatcher();
    for code in [PYTHON_SOCKET, PYTHON_FILE_WRITE] {
        let result = run(&dispatcher, "python", code).await;
        assert!(!result.success);
        assert!(result.stderr.contains("PermissionError"), "{}", result.stderr);
    }
}

#[tokio::test]
async fn test_python_guard_cannot_be_switched_off() {
    if !tool_available("python3") {
        return;
    }
    let result = run(&real_dispatcher(), "python", PYTHON_DISABLES_GUARD).await;
    assert!(result.success, "{:?}", result);
    assert_eq!(result.stdout, "False False\nsocket denied\nwrite denied\n");
}

#[tokio::test]
async fn test_python_namespace_is_fresh_per_call() {
    if !tool_available("python3") {
        return;
    }
    let dispatcher = real_dispatcher();
    assert!(run(&dispatcher, "python", PYTHON_DEFINES_GLOBAL).await.success);
    let result = run(&dispatcher, "python", PYTHON_READS_GLOBAL).await;
    assert!(!result.success);
    assert!(result.stderr.contains("NameError"), "{}", result.stderr);
}

#[tokio::test]
async fn test_python_timeout_keeps_worker_alive() {
    if !tool_available("python3") {
        return;
    }
    let dispatcher = real_dispatcher();
    let result = dispatcher
        .execute(ExecutionRequest::new("python", PYTHON_INFINITE_LOOP).with_time_limit(1_000))
        .await;
    assert!(!result.success);
    assert!(result.stderr.contains("timed out after"), "{}", result.stderr);

    let next = run(&dispatcher, "python", "print('still here')").await;
    assert_eq!(next.stdout, "still here\n");
    assert_eq!(dispatcher.runtime_readiness(), BackendReadiness::Ready);
}

#[tokio::test]
async fn test_python_hung_worker_recovers_on_reload() {
    if !tool_available("python3") {
        return;
    }
    let dispatcher = real_dispatcher();
    let result = dispatcher
        .execute(ExecutionRequest::new("python", PYTHON_CANCELS_TIMER).with_time_limit(500))
        .await;
    assert!(!result.success);
    assert_eq!(result.stderr, "Execution timed out after 500ms");
    assert!(matches!(
        dispatcher.runtime_readiness(),
        BackendReadiness::Failed { .. }
    ));

    let refused = run(&dispatcher, "python", "print(1)").await;
    assert!(refused.stderr.contains("reload required"), "{}", refused.stderr);

    assert!(dispatcher.reload_runtime());
    assert_eq!(dispatcher.runtime_settled().await, BackendReadiness::Ready);
    let next = run(&dispatcher, "python", "print('back')").await;
    assert_eq!(next.stdout, "back\n");
}

#[tokio::test]
async fn test_python_concurrent_calls_get_their_own_output() {
    if !tool_available("python3") {
        return;
    }
    let dispatcher = Arc::new(real_dispatcher());
    dispatcher.warm_up_runtime();
    assert_eq!(dispatcher.runtime_settled().await, BackendReadiness::Ready);

    let mut handles = vec![];
    for i in 0..4 {
        let dispatcher = dispatcher.clone();
        handles.push(tokio::spawn(async move {
            let code = format!("print({} * 10)", i);
            (i, run(&dispatcher, "python", &code).await)
        }));
    }
    for handle in handles {
        let (i, result) = handle.await.unwrap();
        assert_eq!(result.stdout, format!("{}\n", i * 10));
    }
}
