//! Tests for tokio spawner utilities

use fleet_dispatch::core::Spawn;
use fleet_dispatch::runtime::tokio_spawner::TokioSpawner;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_spawner_spawn() {
    let spawner = TokioSpawner::new(tokio::runtime::Handle::current());

    let handle = spawner.spawn(async move { 123 });

    let result = handle.await.expect("task result");
    assert_eq!(result, 123);
}

#[tokio::test]
async fn test_try_current_inside_runtime() {
    assert!(TokioSpawner::try_current().is_ok());
}

#[test]
fn test_try_current_outside_runtime_fails() {
    let err = TokioSpawner::try_current().unwrap_err();
    assert!(err.to_string().contains("no tokio runtime"));
}

#[test]
fn test_dedicated_runtime_runs_tasks() {
    let (spawner, runtime) = TokioSpawner::with_worker_threads(Some(2)).unwrap();
    let handle = spawner.spawn(async { 7 * 6 });
    assert_eq!(runtime.block_on(handle).unwrap(), 42);
}
