use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use upload_scheduler::error::{BoxError, ProcessorError};
use upload_scheduler::scheduler::{Job, JobClass};
use upload_scheduler::worker::{execute, work_fn, JobExecutor};

/// Executor whose work functions count their invocations
fn test_executor(
    blocking_calls: &Arc<AtomicUsize>,
    non_blocking_calls: &Arc<AtomicUsize>,
) -> JobExecutor<&'static str> {
    let blocking_calls = Arc::clone(blocking_calls);
    let non_blocking_calls = Arc::clone(non_blocking_calls);
    JobExecutor::new(
        work_fn(move |_payload: Arc<&'static str>| {
            blocking_calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<(), BoxError>(()) }
        }),
        work_fn(move |payload: Arc<&'static str>| {
            non_blocking_calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if *payload == "bad" {
                    return Err::<(), BoxError>("503 Service Unavailable".into());
                }
                if *payload == "panic" {
                    panic!("upload task crashed");
                }
                Ok(())
            }
        }),
    )
}

#[tokio::test]
async fn test_blocking_runner_rejects_non_blocking_job() {
    let blocking_calls = Arc::new(AtomicUsize::new(0));
    let non_blocking_calls = Arc::new(AtomicUsize::new(0));
    let executor = test_executor(&blocking_calls, &non_blocking_calls);
    let job = Job::non_blocking("file");

    let err = executor.run_blocking(&job).err().unwrap();
    match err {
        ProcessorError::ClassMismatch {
            job_id,
            expected,
            actual,
        } => {
            assert_eq!(job_id, job.id);
            assert_eq!(expected, JobClass::Blocking);
            assert_eq!(actual, JobClass::NonBlocking);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(blocking_calls.load(Ordering::SeqCst), 0);
    assert_eq!(non_blocking_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_non_blocking_runner_rejects_blocking_job() {
    let blocking_calls = Arc::new(AtomicUsize::new(0));
    let non_blocking_calls = Arc::new(AtomicUsize::new(0));
    let executor = test_executor(&blocking_calls, &non_blocking_calls);

    let err = executor.run_non_blocking(&Job::blocking("dir")).err().unwrap();
    assert!(matches!(
        err,
        ProcessorError::ClassMismatch {
            expected: JobClass::NonBlocking,
            actual: JobClass::Blocking,
            ..
        }
    ));
    assert_eq!(blocking_calls.load(Ordering::SeqCst), 0);
    assert_eq!(non_blocking_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_run_selects_work_by_class() {
    let blocking_calls = Arc::new(AtomicUsize::new(0));
    let non_blocking_calls = Arc::new(AtomicUsize::new(0));
    let executor = test_executor(&blocking_calls, &non_blocking_calls);

    let dir = Job::blocking("dir");
    let work = executor.run(&dir).unwrap();
    let result = execute(dir.id, 0, dir.class, work).await;
    assert!(result.outcome.is_ok());
    assert_eq!(result.job_id, dir.id);
    assert_eq!(result.class, JobClass::Blocking);

    let file = Job::non_blocking("file");
    let work = executor.run(&file).unwrap();
    let result = execute(file.id, 1, file.class, work).await;
    assert!(result.outcome.is_ok());
    assert_eq!(result.slot, 1);

    assert_eq!(blocking_calls.load(Ordering::SeqCst), 1);
    assert_eq!(non_blocking_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_execute_failure_builds_error_record() {
    let blocking_calls = Arc::new(AtomicUsize::new(0));
    let non_blocking_calls = Arc::new(AtomicUsize::new(0));
    let executor = test_executor(&blocking_calls, &non_blocking_calls);
    let job = Job::non_blocking("bad");

    let work = executor.run_non_blocking(&job).unwrap();
    let result = execute(job.id, 7, job.class, work).await;

    let failure = result.outcome.unwrap_err();
    assert_eq!(failure.message, "Upload failed");
    assert!(failure.full_message.is_empty());
    assert_eq!(failure.cause.to_string(), "503 Service Unavailable");
}

#[tokio::test]
async fn test_execute_contains_panics() {
    let blocking_calls = Arc::new(AtomicUsize::new(0));
    let non_blocking_calls = Arc::new(AtomicUsize::new(0));
    let executor = test_executor(&blocking_calls, &non_blocking_calls);
    let job = Job::non_blocking("panic");

    let work = executor.run(&job).unwrap();
    let result = execute(job.id, 3, job.class, work).await;

    assert!(result.outcome.is_err());
    assert_eq!(result.job_id, job.id);
}
