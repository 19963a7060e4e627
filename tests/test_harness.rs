//! Test harness for processor integration tests.
//!
//! Provides a probe that records how work functions are invoked, jobs whose
//! behaviour (gate, fail, panic) is chosen per job, and polling helpers.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;
use upload_scheduler::config::ProcessorConfig;
use upload_scheduler::error::BoxError;
use upload_scheduler::processor::JobProcessor;
use upload_scheduler::scheduler::{Job, JobClass};
use upload_scheduler::worker::work_fn;

/// Short tick so tests do not wait on the production cadence
pub fn test_config() -> ProcessorConfig {
    ProcessorConfig::default().with_tick_interval(Duration::from_millis(10))
}

/// Payload used by processor tests
#[derive(Debug)]
pub struct TestJob {
    pub name: String,
    /// Block inside the work function until the probe releases a permit
    pub gated: bool,
    /// Number of attempts that fail before the job starts succeeding
    pub failures_left: AtomicU32,
    pub panics: bool,
}

impl TestJob {
    pub fn ok(name: &str) -> Self {
        Self {
            name: name.to_string(),
            gated: false,
            failures_left: AtomicU32::new(0),
            panics: false,
        }
    }

    #[allow(dead_code)]
    pub fn gated(name: &str) -> Self {
        Self {
            gated: true,
            ..Self::ok(name)
        }
    }

    #[allow(dead_code)]
    pub fn failing(name: &str) -> Self {
        Self::failing_times(name, u32::MAX)
    }

    #[allow(dead_code)]
    pub fn failing_times(name: &str, times: u32) -> Self {
        Self {
            failures_left: AtomicU32::new(times),
            ..Self::ok(name)
        }
    }

    #[allow(dead_code)]
    pub fn panicking(name: &str) -> Self {
        Self {
            panics: true,
            ..Self::ok(name)
        }
    }
}

/// Records concurrency observed by the work functions
#[derive(Debug)]
pub struct WorkProbe {
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub blocking_active: AtomicBool,
    /// Times a job started while a Blocking job was running, or a Blocking job
    /// started while anything else was running
    pub exclusion_violations: AtomicUsize,
    pub started: Mutex<Vec<String>>,
    gate: Semaphore,
}

impl WorkProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            blocking_active: AtomicBool::new(false),
            exclusion_violations: AtomicUsize::new(0),
            started: Mutex::new(Vec::new()),
            gate: Semaphore::new(0),
        })
    }

    /// Let `n` gated jobs finish
    #[allow(dead_code)]
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn violations(&self) -> usize {
        self.exclusion_violations.load(Ordering::SeqCst)
    }

    async fn run(&self, job: &TestJob, class: JobClass) -> Result<(), BoxError> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        match class {
            JobClass::Blocking => {
                if active > 1 {
                    self.exclusion_violations.fetch_add(1, Ordering::SeqCst);
                }
                self.blocking_active.store(true, Ordering::SeqCst);
            }
            JobClass::NonBlocking => {
                if self.blocking_active.load(Ordering::SeqCst) {
                    self.exclusion_violations.fetch_add(1, Ordering::SeqCst);
                }
            }
        }
        self.started.lock().unwrap().push(job.name.clone());

        if job.gated {
            self.gate.acquire().await.unwrap().forget();
        }

        if class == JobClass::Blocking {
            self.blocking_active.store(false, Ordering::SeqCst);
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if job.panics {
            panic!("work for {} panicked", job.name);
        }
        let should_fail = job
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(format!("{} rejected", job.name).into());
        }
        Ok(())
    }
}

/// Build a processor whose work functions report to `probe`
pub fn test_processor(probe: &Arc<WorkProbe>, config: ProcessorConfig) -> JobProcessor<TestJob> {
    let blocking_probe = Arc::clone(probe);
    let non_blocking_probe = Arc::clone(probe);
    JobProcessor::builder(
        work_fn(move |job: Arc<TestJob>| {
            let probe = Arc::clone(&blocking_probe);
            async move { probe.run(&job, JobClass::Blocking).await }
        }),
        work_fn(move |job: Arc<TestJob>| {
            let probe = Arc::clone(&non_blocking_probe);
            async move { probe.run(&job, JobClass::NonBlocking).await }
        }),
    )
    .config(config)
    .build()
    .unwrap()
}

#[allow(dead_code)]
pub fn blocking(job: TestJob) -> Job<TestJob> {
    Job::blocking(job)
}

#[allow(dead_code)]
pub fn non_blocking(job: TestJob) -> Job<TestJob> {
    Job::non_blocking(job)
}

/// Wait for a condition to become true, with timeout
pub async fn wait_for<F, Fut>(
    condition: F,
    timeout_duration: Duration,
    poll_interval: Duration,
) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = tokio::time::Instant::now();
    while start.elapsed() < timeout_duration {
        if condition().await {
            return true;
        }
        tokio::time::sleep(poll_interval).await;
    }
    false
}

/// Assert a condition eventually becomes true
#[allow(dead_code)]
pub async fn assert_eventually<F, Fut>(condition: F, timeout_duration: Duration, message: &str)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let result = wait_for(condition, timeout_duration, Duration::from_millis(5)).await;
    assert!(result, "{}", message);
}
