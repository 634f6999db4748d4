use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveTime, TimeDelta, TimeZone, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::scan::{ScanJob, ScanReport};

/// When a scheduled task fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Fixed period; the first run happens one period after start.
    Every(Duration),
    /// Once a day at `time` in the given offset.
    DailyAt { time: NaiveTime, offset: FixedOffset },
}

impl Trigger {
    /// How long to wait from `now` until the next firing.
    pub fn delay_until_next(&self, now: DateTime<Utc>) -> Duration {
        match *self {
            Trigger::Every(period) => period,
            Trigger::DailyAt { time, offset } => {
                let local = now.with_timezone(&offset);
                let mut next = local.date_naive().and_time(time);
                if next <= local.naive_local() {
                    next += TimeDelta::days(1);
                }
                // A fixed offset maps every local time to exactly one instant.
                match offset.from_local_datetime(&next).single() {
                    Some(at) => (at.with_timezone(&Utc) - now).to_std().unwrap_or_default(),
                    None => Duration::from_secs(24 * 60 * 60),
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Completed(ScanReport),
    /// The previous tick of the same scan was still running.
    Skipped,
    Failed(String),
}

/// Runs one scan with an IDLE/RUNNING guard so ticks of the same scan never overlap.
#[derive(Clone)]
pub struct ScanRunner {
    job: Arc<dyn ScanJob>,
    running: Arc<AtomicBool>,
}

struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ScanRunner {
    pub fn new(job: Arc<dyn ScanJob>) -> Self {
        Self {
            job,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.job.name()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Runs a tick unless one is already in flight. Failures and panics are
    /// reported in the outcome, never propagated.
    pub async fn trigger(&self) -> TickOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            info!(scan = self.name(), "Previous tick still running, skipping");
            return TickOutcome::Skipped;
        }

        // The guard lives in the spawned task, so the scan stays marked as
        // running even if the caller stops waiting.
        let guard = RunningGuard(self.running.clone());
        let job = self.job.clone();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            job.run().await
        });

        match handle.await {
            Ok(Ok(report)) => TickOutcome::Completed(report),
            Ok(Err(e)) => {
                warn!(scan = self.name(), "Scan tick failed: {:#}", e);
                TickOutcome::Failed(e.to_string())
            }
            Err(e) => {
                warn!(scan = self.name(), "Scan tick aborted: {}", e);
                TickOutcome::Failed(e.to_string())
            }
        }
    }
}

struct ScheduledTask {
    trigger: Trigger,
    runner: ScanRunner,
}

/// The process-wide list of periodic scans, started and stopped together.
#[derive(Default)]
pub struct Scheduler {
    tasks: Vec<ScheduledTask>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a job. The returned runner shares the job's running guard,
    /// so manual triggers cannot overlap scheduled ticks.
    pub fn add(&mut self, trigger: Trigger, job: Arc<dyn ScanJob>) -> ScanRunner {
        let runner = ScanRunner::new(job);
        self.tasks.push(ScheduledTask {
            trigger,
            runner: runner.clone(),
        });
        runner
    }

    pub fn start(self) -> SchedulerHandle {
        let shutdown = CancellationToken::new();
        let tasks = self
            .tasks
            .into_iter()
            .map(|task| {
                info!(scan = task.runner.name(), trigger = ?task.trigger, "Scheduling scan");
                tokio::spawn(run_task(task, shutdown.clone()))
            })
            .collect();

        SchedulerHandle { shutdown, tasks }
    }
}

async fn run_task(task: ScheduledTask, shutdown: CancellationToken) {
    loop {
        let delay = task.trigger.delay_until_next(Utc::now());
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
        // Shutdown is only observed between ticks; an in-flight tick finishes.
        task.runner.trigger().await;
    }
    info!(scan = task.runner.name(), "Scan task stopped");
}

pub struct SchedulerHandle {
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Stops scheduling new ticks and waits for in-flight ones to finish.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("Scan task ended abnormally: {}", e);
            }
        }
        info!("Scheduler shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    /// Counts runs; can be told to block, fail or panic.
    #[derive(Default)]
    struct FakeJob {
        runs: AtomicUsize,
        gate: Option<Arc<Notify>>,
        fail: bool,
        panic: bool,
    }

    #[async_trait]
    impl ScanJob for FakeJob {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn run(&self) -> anyhow::Result<ScanReport> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.panic {
                panic!("scan exploded");
            }
            if self.fail {
                anyhow::bail!("store unavailable");
            }
            Ok(ScanReport::default())
        }
    }

    fn at(raw: &str) -> DateTime<Utc> {
        raw.parse().unwrap()
    }

    #[test]
    fn daily_trigger_fires_later_today_or_tomorrow() {
        let trigger = Trigger::DailyAt {
            time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            offset: FixedOffset::east_opt(3 * 3600).unwrap(),
        };
        // 05:00 UTC = 08:00 local: one hour to go.
        assert_eq!(
            trigger.delay_until_next(at("2026-03-01T05:00:00Z")),
            Duration::from_secs(3600)
        );
        // 06:00 UTC = 09:00 local exactly: next is tomorrow.
        assert_eq!(
            trigger.delay_until_next(at("2026-03-01T06:00:00Z")),
            Duration::from_secs(24 * 3600)
        );
    }

    #[test]
    fn interval_trigger_waits_one_period() {
        let trigger = Trigger::Every(Duration::from_secs(1800));
        assert_eq!(trigger.delay_until_next(Utc::now()), Duration::from_secs(1800));
    }

    #[tokio::test]
    async fn overlapping_trigger_is_skipped() {
        let gate = Arc::new(Notify::new());
        let job = Arc::new(FakeJob {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let runner = ScanRunner::new(job.clone());

        let first = tokio::spawn({
            let runner = runner.clone();
            async move { runner.trigger().await }
        });
        while !runner.is_running() {
            tokio::task::yield_now().await;
        }

        assert_eq!(runner.trigger().await, TickOutcome::Skipped);
        gate.notify_one();
        assert_eq!(first.await.unwrap(), TickOutcome::Completed(ScanReport::default()));
        assert!(!runner.is_running());
        assert_eq!(job.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failures_and_panics_are_contained() {
        let failing = ScanRunner::new(Arc::new(FakeJob { fail: true, ..Default::default() }));
        assert!(matches!(failing.trigger().await, TickOutcome::Failed(msg) if msg.contains("store unavailable")));
        assert!(!failing.is_running());

        let panicking = ScanRunner::new(Arc::new(FakeJob { panic: true, ..Default::default() }));
        assert!(matches!(panicking.trigger().await, TickOutcome::Failed(_)));
        // The next tick proceeds normally.
        assert!(matches!(panicking.trigger().await, TickOutcome::Failed(_)));
        assert!(!panicking.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_ticks_until_shutdown() {
        let job = Arc::new(FakeJob::default());
        let mut scheduler = Scheduler::new();
        scheduler.add(Trigger::Every(Duration::from_secs(60)), job.clone());
        let handle = scheduler.start();

        tokio::time::sleep(Duration::from_secs(150)).await;
        handle.shutdown().await;
        let runs = job.runs.load(Ordering::SeqCst);
        assert_eq!(runs, 2);

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(job.runs.load(Ordering::SeqCst), runs);
    }
}
