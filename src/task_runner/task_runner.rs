use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, trace};

use crate::common::error::TradeError;

/// A single atomic step of a protocol sequence.
///
/// `run` resolves exactly once, to either success or failure. A task that needs to wait on
/// something asynchronous (a broadcast, a confirmation) simply awaits it.
#[async_trait]
pub trait Task<C: Send>: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, ctx: &mut C) -> Result<(), TradeError>;
}

/// Runs an ordered list of tasks against one shared context, stopping at the first failure.
pub struct TaskRunner<C: Send> {
    label: &'static str,
    tasks: Vec<Box<dyn Task<C>>>,
    deadline: Option<Duration>,
    result_handler: Box<dyn FnOnce() + Send>,
    error_handler: Box<dyn FnOnce(String) + Send>,
}

impl<C: Send> TaskRunner<C> {
    pub fn new(
        label: &'static str,
        result_handler: impl FnOnce() + Send + 'static,
        error_handler: impl FnOnce(String) + Send + 'static,
    ) -> Self {
        TaskRunner {
            label,
            tasks: Vec::new(),
            deadline: None,
            result_handler: Box::new(result_handler),
            error_handler: Box::new(error_handler),
        }
    }

    // Applies to each task individually, not to the sequence as a whole
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn add_tasks(&mut self, tasks: Vec<Box<dyn Task<C>>>) -> &mut Self {
        self.tasks.extend(tasks);
        self
    }

    pub fn task_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|task| task.name()).collect()
    }

    pub async fn run(self, ctx: &mut C) -> Result<(), TradeError> {
        let TaskRunner {
            label,
            tasks,
            deadline,
            result_handler,
            error_handler,
        } = self;

        debug!("TaskRunner {} starting with {} tasks", label, tasks.len());

        for task in tasks.iter() {
            let task_name = task.name();
            trace!("TaskRunner {} running task {}", label, task_name);

            let result = match deadline {
                Some(deadline) => match tokio::time::timeout(deadline, task.run(ctx)).await {
                    Ok(result) => result,
                    Err(_) => Err(TradeError::TaskTimeout {
                        task: task_name,
                        timeout: deadline,
                    }),
                },
                None => task.run(ctx).await,
            };

            if let Err(error) = result {
                let reason = error.to_string();
                error!(
                    "TaskRunner {} aborted at task {} - {}",
                    label, task_name, reason
                );
                error_handler(reason.clone());
                return Err(TradeError::TaskFailure {
                    task: task_name,
                    reason,
                });
            }
        }

        result_handler();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };

    #[derive(Default)]
    struct SomeContext {
        executed: Vec<&'static str>,
        addresses: Vec<usize>,
    }

    struct SomeTask {
        name: &'static str,
        fail: bool,
    }

    #[async_trait]
    impl Task<SomeContext> for SomeTask {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn run(&self, ctx: &mut SomeContext) -> Result<(), TradeError> {
            ctx.executed.push(self.name);
            let address = &*ctx as *const SomeContext as usize;
            ctx.addresses.push(address);
            tokio::task::yield_now().await;
            if self.fail {
                Err(TradeError::Simple(format!("{} went wrong", self.name)))
            } else {
                Ok(())
            }
        }
    }

    struct NeverSignals;

    #[async_trait]
    impl Task<SomeContext> for NeverSignals {
        fn name(&self) -> &'static str {
            "NeverSignals"
        }

        async fn run(&self, _ctx: &mut SomeContext) -> Result<(), TradeError> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    fn some_tasks(fail_at: Option<usize>, count: usize) -> Vec<Box<dyn Task<SomeContext>>> {
        const NAMES: [&str; 5] = ["A", "B", "C", "D", "E"];
        (0..count)
            .map(|index| {
                Box::new(SomeTask {
                    name: NAMES[index],
                    fail: fail_at == Some(index),
                }) as Box<dyn Task<SomeContext>>
            })
            .collect()
    }

    fn counting_runner(
        completed: Arc<AtomicUsize>,
        faults: Arc<Mutex<Vec<String>>>,
    ) -> TaskRunner<SomeContext> {
        TaskRunner::new(
            "test",
            move || {
                completed.fetch_add(1, Ordering::SeqCst);
            },
            move |error| faults.lock().unwrap().push(error),
        )
    }

    #[tokio::test]
    async fn test_all_tasks_succeed_in_order() {
        let completed = Arc::new(AtomicUsize::new(0));
        let faults = Arc::new(Mutex::new(Vec::new()));
        let mut runner = counting_runner(completed.clone(), faults.clone());
        runner.add_tasks(some_tasks(None, 5));
        assert_eq!(runner.task_names(), vec!["A", "B", "C", "D", "E"]);

        let mut ctx = SomeContext::default();
        runner.run(&mut ctx).await.unwrap();

        assert_eq!(ctx.executed, vec!["A", "B", "C", "D", "E"]);
        assert_eq!(completed.load(Ordering::SeqCst), 1);
        assert!(faults.lock().unwrap().is_empty());

        // Every task saw the very same context instance
        let first = ctx.addresses[0];
        assert!(ctx.addresses.iter().all(|address| *address == first));
    }

    #[tokio::test]
    async fn test_failure_skips_remaining_tasks() {
        let completed = Arc::new(AtomicUsize::new(0));
        let faults = Arc::new(Mutex::new(Vec::new()));
        let mut runner = counting_runner(completed.clone(), faults.clone());
        runner.add_tasks(some_tasks(Some(2), 5));

        let mut ctx = SomeContext::default();
        let result = runner.run(&mut ctx).await;

        match result {
            Err(TradeError::TaskFailure { task, reason }) => {
                assert_eq!(task, "C");
                assert!(reason.contains("C went wrong"));
            }
            other => panic!("Unexpected result {:?}", other),
        }
        assert_eq!(ctx.executed, vec!["A", "B", "C"]);
        assert_eq!(completed.load(Ordering::SeqCst), 0);

        let faults = faults.lock().unwrap();
        assert_eq!(faults.len(), 1);
        assert!(faults[0].contains("C went wrong"));
    }

    #[tokio::test]
    async fn test_first_task_failure() {
        let completed = Arc::new(AtomicUsize::new(0));
        let faults = Arc::new(Mutex::new(Vec::new()));
        let mut runner = counting_runner(completed.clone(), faults.clone());
        runner.add_tasks(some_tasks(Some(0), 3));

        let mut ctx = SomeContext::default();
        assert!(runner.run(&mut ctx).await.is_err());
        assert_eq!(ctx.executed, vec!["A"]);
        assert_eq!(completed.load(Ordering::SeqCst), 0);
        assert_eq!(faults.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_add_tasks_appends() {
        let completed = Arc::new(AtomicUsize::new(0));
        let faults = Arc::new(Mutex::new(Vec::new()));
        let mut runner = counting_runner(completed.clone(), faults);
        runner.add_tasks(some_tasks(None, 2));
        runner.add_tasks(vec![Box::new(SomeTask {
            name: "Z",
            fail: false,
        })]);

        let mut ctx = SomeContext::default();
        runner.run(&mut ctx).await.unwrap();
        assert_eq!(ctx.executed, vec!["A", "B", "Z"]);
        assert_eq!(completed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_runner_completes() {
        let completed = Arc::new(AtomicUsize::new(0));
        let faults = Arc::new(Mutex::new(Vec::new()));
        let runner = counting_runner(completed.clone(), faults.clone());

        let mut ctx = SomeContext::default();
        runner.run(&mut ctx).await.unwrap();
        assert_eq!(completed.load(Ordering::SeqCst), 1);
        assert!(faults.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_task_deadline_turns_hang_into_fault() {
        let completed = Arc::new(AtomicUsize::new(0));
        let faults = Arc::new(Mutex::new(Vec::new()));
        let mut runner = counting_runner(completed.clone(), faults.clone())
            .with_deadline(Duration::from_millis(20));
        runner.add_tasks(vec![
            Box::new(SomeTask {
                name: "A",
                fail: false,
            }),
            Box::new(NeverSignals),
            Box::new(SomeTask {
                name: "C",
                fail: false,
            }),
        ]);

        let mut ctx = SomeContext::default();
        let result = runner.run(&mut ctx).await;

        match result {
            Err(TradeError::TaskFailure { task, .. }) => assert_eq!(task, "NeverSignals"),
            other => panic!("Unexpected result {:?}", other),
        }
        assert_eq!(ctx.executed, vec!["A"]);
        assert_eq!(completed.load(Ordering::SeqCst), 0);
        assert_eq!(faults.lock().unwrap().len(), 1);
    }
}
