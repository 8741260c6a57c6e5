//! BatchQueue tests

use std::sync::{Arc, Mutex};

use pagetrace_core::executor::{DeferredExecutor, ManualExecutor, TokioIdleExecutor};
use pagetrace_core::queue::BatchQueue;

fn recorder() -> (Arc<Mutex<Vec<u32>>>, impl Fn(u32) -> Box<dyn FnOnce() + Send>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    let task = move |n: u32| {
        let sink = sink.clone();
        Box::new(move || sink.lock().unwrap().push(n)) as Box<dyn FnOnce() + Send>
    };
    (log, task)
}

#[test]
fn test_one_flush_per_window() {
    let executor = Arc::new(ManualExecutor::new());
    let queue = BatchQueue::new(executor.clone());
    let (log, task) = recorder();

    for n in 1..=5 {
        queue.enqueue(task(n));
    }

    assert_eq!(executor.total_deferred(), 1);
    assert_eq!(queue.pending_len(), 5);
    assert!(log.lock().unwrap().is_empty());

    executor.run_pending();
    assert_eq!(*log.lock().unwrap(), vec![1, 2, 3, 4, 5]);
    assert!(queue.is_empty());

    let stats = queue.stats();
    assert_eq!(stats.total_enqueued, 5);
    assert_eq!(stats.total_executed, 5);
    assert_eq!(stats.flush_count, 1);
    assert!(stats.last_flush_at.is_some());
}

#[test]
fn test_task_enqueued_during_flush_runs_next_batch() {
    let executor = Arc::new(ManualExecutor::new());
    let queue = BatchQueue::new(executor.clone());
    let (log, task) = recorder();

    let inner = task(2);
    let requeue = queue.clone();
    let first_log = log.clone();
    queue.enqueue(Box::new(move || {
        first_log.lock().unwrap().push(1);
        requeue.enqueue(inner);
    }));

    assert_eq!(executor.run_pending(), 1);
    assert_eq!(*log.lock().unwrap(), vec![1]);
    assert_eq!(queue.pending_len(), 1);
    assert_eq!(executor.pending(), 1, "a second flush is scheduled");

    executor.run_pending();
    assert_eq!(*log.lock().unwrap(), vec![1, 2]);
    assert_eq!(queue.stats().flush_count, 2);
}

#[test]
fn test_new_window_after_flush() {
    let executor = Arc::new(ManualExecutor::new());
    let queue = BatchQueue::new(executor.clone());
    let (log, task) = recorder();

    queue.enqueue(task(1));
    executor.run_pending();
    queue.enqueue(task(2));
    queue.enqueue(task(3));

    assert_eq!(executor.total_deferred(), 2);
    executor.run_pending();
    assert_eq!(*log.lock().unwrap(), vec![1, 2, 3]);
}

#[test]
fn test_manual_flush_and_clear() {
    let executor = Arc::new(ManualExecutor::new());
    let queue = BatchQueue::new(executor.clone());
    let (log, task) = recorder();

    queue.enqueue(task(1));
    assert_eq!(queue.flush(), 1);
    assert_eq!(*log.lock().unwrap(), vec![1]);

    // The deferred flush finds nothing left
    assert_eq!(executor.run_pending(), 1);
    assert_eq!(queue.stats().flush_count, 1);

    queue.enqueue(task(2));
    assert_eq!(queue.clear(), 1);
    executor.run_pending();
    assert_eq!(*log.lock().unwrap(), vec![1]);
}

#[tokio::test]
async fn test_tokio_idle_executor_flushes() {
    let executor: Arc<dyn DeferredExecutor> = Arc::new(TokioIdleExecutor::current().unwrap());
    let queue = BatchQueue::new(executor);
    let (log, task) = recorder();

    for n in 1..=3 {
        queue.enqueue(task(n));
    }
    assert!(log.lock().unwrap().is_empty());

    while !queue.is_empty() {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    assert_eq!(*log.lock().unwrap(), vec![1, 2, 3]);
}
