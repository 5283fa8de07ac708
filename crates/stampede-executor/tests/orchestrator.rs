//! Native executor runs against an in-process driver.

use async_trait::async_trait;
use stampede_core::{
    BuildQueriesContext, DriverConfig, DriverQuery, ExecutorType, GenerationRule,
    NativeExecutorConfig, NumericRange, QueryDescriptor, QueryParamDescriptor, RuleKind,
    RunConfig, StepContext, StepDescriptor, StepQueryDescriptor, Transaction, UnitBuildContext,
    UnitDescriptor, UnitKind,
};
use stampede_executor::{
    execute_step, DriverConnector, ExecutorError, NativeExecutor, Shutdown,
};
use stampede_generator::{QueryBuilder, TransactionBuilder};
use stampede_plugin::{Driver, DriverError, Sidecar, TransactionStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Default)]
struct StubDriver {
    initialized: AtomicUsize,
    attempts: AtomicUsize,
    executed: AtomicUsize,
    queries_run: AtomicUsize,
    torn_down: AtomicUsize,
    fail_first: bool,
    fail_initialize: bool,
    fail_teardown: bool,
    delay: Duration,
}

#[async_trait]
impl Driver for StubDriver {
    async fn initialize(&self, _context: &StepContext) -> Result<(), DriverError> {
        self.initialized.fetch_add(1, Ordering::SeqCst);
        if self.fail_initialize {
            return Err(DriverError::Remote("database unreachable".to_string()));
        }
        Ok(())
    }

    async fn build_transactions_from_unit(
        &self,
        context: &UnitBuildContext,
    ) -> Result<Vec<Transaction>, DriverError> {
        let builder = TransactionBuilder::for_unit(context.context.config.seed, &context.unit)?;
        Ok(builder.collect::<Result<_, _>>()?)
    }

    async fn build_transactions_from_unit_stream(
        &self,
        context: &UnitBuildContext,
    ) -> Result<TransactionStream, DriverError> {
        let mut builder = TransactionBuilder::for_unit(context.context.config.seed, &context.unit)?;
        let broken = context.unit.name == "broken";

        let (sender, receiver) = mpsc::channel(4);
        tokio::spawn(async move {
            let mut sent = 0;
            while let Some(item) = builder.next() {
                if broken && sent == 1 {
                    let _ = sender
                        .send(Err(DriverError::Remote("backend went away".to_string())))
                        .await;
                    return;
                }
                if sender.send(item.map_err(DriverError::from)).await.is_err() {
                    return;
                }
                sent += 1;
            }
        });
        Ok(TransactionStream::from_receiver(receiver))
    }

    async fn run_transaction(&self, _transaction: &Transaction) -> Result<(), DriverError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_first && attempt == 0 {
            return Err(DriverError::Remote("deadlock detected".to_string()));
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.executed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn teardown(&self) -> Result<(), DriverError> {
        self.torn_down.fetch_add(1, Ordering::SeqCst);
        if self.fail_teardown {
            return Err(DriverError::Remote("could not drop tables".to_string()));
        }
        Ok(())
    }

    async fn build_queries(
        &self,
        context: &BuildQueriesContext,
    ) -> Result<Vec<DriverQuery>, DriverError> {
        match &context.query {
            StepQueryDescriptor::Query(query) => {
                let mut builder = QueryBuilder::new(context.context.config.seed, query.count, query)?;
                Ok(builder.build_many(query.count)?)
            }
            StepQueryDescriptor::CreateTable(table) => {
                Ok(vec![DriverQuery::new(&table.name, "CREATE TABLE")])
            }
        }
    }

    async fn run_query(&self, _query: &DriverQuery) -> Result<(), DriverError> {
        self.queries_run.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct StubConnector {
    driver: Arc<StubDriver>,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl DriverConnector for StubConnector {
    async fn connect(
        &self,
        _config: &DriverConfig,
        shutdown: &Shutdown,
    ) -> Result<Arc<dyn Driver>, ExecutorError> {
        let closed = Arc::clone(&self.closed);
        shutdown.register("stub driver", move || async move {
            closed.fetch_add(1, Ordering::SeqCst);
        });
        let driver: Arc<dyn Driver> = Arc::clone(&self.driver) as Arc<dyn Driver>;
        Ok(driver)
    }
}

struct Harness {
    driver: Arc<StubDriver>,
    closed: Arc<AtomicUsize>,
    executor: NativeExecutor,
}

fn harness(driver: StubDriver) -> Harness {
    let driver = Arc::new(driver);
    let closed = Arc::new(AtomicUsize::new(0));
    let executor = NativeExecutor::with_connector(Arc::new(StubConnector {
        driver: Arc::clone(&driver),
        closed: Arc::clone(&closed),
    }));
    Harness {
        driver,
        closed,
        executor,
    }
}

fn unit(name: &str, count: u64) -> UnitDescriptor {
    let query = QueryDescriptor::new("insert", "INSERT INTO t VALUES (${id})").with_param(
        QueryParamDescriptor::new(
            "id",
            GenerationRule::new(RuleKind::Int64 {
                range: NumericRange::new(1, 1_000_000),
                constant: None,
            })
            .with_unique(true),
        ),
    );
    UnitDescriptor::new(name, count, UnitKind::Query(query))
}

fn context(step: StepDescriptor, cancel_on_error: bool) -> StepContext {
    let config = RunConfig::default()
        .with_seed(11)
        .with_driver(DriverConfig::new("stub"))
        .with_native_executor(NativeExecutorConfig {
            max_parallelism: 2,
            cancel_on_error,
        });
    StepContext::new("bench", step.with_executor(ExecutorType::Native), config)
}

fn step(units: &[(&str, u64)], concurrent: bool) -> StepDescriptor {
    units.iter().fold(
        StepDescriptor::new("load").with_async(concurrent),
        |step, (name, count)| step.with_unit(unit(name, *count)),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_every_transaction_runs_once() {
    for (concurrent, cancel_on_error) in [(false, false), (true, true)] {
        let h = harness(StubDriver::default());
        let context = context(
            step(&[("a", 2), ("b", 2), ("c", 2)], concurrent),
            cancel_on_error,
        );

        tokio_test::assert_ok!(execute_step(&h.executor, context, &Shutdown::new()).await);

        assert_eq!(h.driver.initialized.load(Ordering::SeqCst), 1);
        assert_eq!(h.driver.executed.load(Ordering::SeqCst), 6);
        assert_eq!(h.driver.torn_down.load(Ordering::SeqCst), 1);
        assert_eq!(h.closed.load(Ordering::SeqCst), 1, "driver cleanup runs after the step");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_large_unit_through_small_handoff() {
    let h = harness(StubDriver::default());
    let mut context = context(step(&[("bulk", 500)], true), false);
    context.config.handoff_capacity = 1;

    execute_step(&h.executor, context, &Shutdown::new())
        .await
        .unwrap();
    assert_eq!(h.driver.executed.load(Ordering::SeqCst), 500);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_on_error_skips_remaining_transactions() {
    let h = harness(StubDriver {
        fail_first: true,
        delay: Duration::from_millis(20),
        ..Default::default()
    });
    let context = context(step(&[("orders", 20)], true), true);

    let err = execute_step(&h.executor, context, &Shutdown::new())
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Driver error: deadlock detected");
    assert!(h.driver.attempts.load(Ordering::SeqCst) < 20);
    assert!(h.driver.executed.load(Ordering::SeqCst) < 19);
    assert_eq!(h.driver.torn_down.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_on_error_across_units() {
    for _ in 0..20 {
        let h = harness(StubDriver {
            fail_first: true,
            delay: Duration::from_millis(200),
            ..Default::default()
        });
        let context = context(step(&[("a", 2), ("b", 2), ("c", 2)], true), true);

        let err = execute_step(&h.executor, context, &Shutdown::new())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Driver error: deadlock detected");
        assert!(!err.is_cancelled());
        assert!(
            h.driver.executed.load(Ordering::SeqCst) < 5,
            "no transaction was skipped"
        );
        assert_eq!(h.driver.torn_down.load(Ordering::SeqCst), 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_without_cancel_on_error_everything_runs() {
    let h = harness(StubDriver {
        fail_first: true,
        ..Default::default()
    });
    let context = context(step(&[("orders", 20)], true), false);

    let err = execute_step(&h.executor, context, &Shutdown::new())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("deadlock detected"));
    assert_eq!(h.driver.attempts.load(Ordering::SeqCst), 20);
    assert_eq!(h.driver.executed.load(Ordering::SeqCst), 19);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stream_error_fails_the_step() {
    let h = harness(StubDriver::default());
    let context = context(step(&[("healthy", 3), ("broken", 10)], true), false);

    let err = execute_step(&h.executor, context, &Shutdown::new())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("backend went away"));
    assert_eq!(h.driver.torn_down.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_teardown_error_is_surfaced() {
    let h = harness(StubDriver {
        fail_teardown: true,
        ..Default::default()
    });
    let context = context(step(&[("a", 1)], false), false);

    let err = execute_step(&h.executor, context, &Shutdown::new())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Driver error: could not drop tables");
    assert_eq!(h.driver.executed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unit_and_teardown_errors_are_both_reported() {
    let h = harness(StubDriver {
        fail_first: true,
        fail_teardown: true,
        ..Default::default()
    });
    let context = context(step(&[("a", 3)], false), true);

    let err = execute_step(&h.executor, context, &Shutdown::new())
        .await
        .unwrap_err();

    assert!(matches!(&err, ExecutorError::Joined(errors) if errors.len() == 2));
    let message = err.to_string();
    assert!(message.contains("deadlock detected"), "{message}");
    assert!(message.contains("could not drop tables"), "{message}");
    assert_eq!(h.driver.torn_down.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_legacy_queries() {
    let h = harness(StubDriver::default());
    let step = StepDescriptor::new("seed")
        .with_async(true)
        .with_query(StepQueryDescriptor::Query(
            QueryDescriptor::new("select", "SELECT 1").with_count(4),
        ))
        .with_query(StepQueryDescriptor::Query(
            QueryDescriptor::new("update", "UPDATE t SET x = 1").with_count(3),
        ));

    execute_step(&h.executor, context(step, false), &Shutdown::new())
        .await
        .unwrap();

    assert_eq!(h.driver.queries_run.load(Ordering::SeqCst), 7);
    assert_eq!(h.driver.executed.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_shutdown_stops_a_running_step() {
    let h = harness(StubDriver {
        delay: Duration::from_secs(30),
        ..Default::default()
    });
    let context = context(step(&[("slow", 10)], true), false);
    let shutdown = Shutdown::new();

    let stopper = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        stopper.stop();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        execute_step(&h.executor, context, &shutdown),
    )
    .await
    .expect("step should stop promptly");

    assert!(result.unwrap_err().is_cancelled());
    assert_eq!(h.driver.executed.load(Ordering::SeqCst), 0);
    assert_eq!(h.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_missing_configuration() {
    let h = harness(StubDriver::default());

    let mut context = context(step(&[("a", 1)], false), false);
    context.config.native_executor = None;
    assert!(matches!(
        execute_step(&h.executor, context, &Shutdown::new()).await,
        Err(ExecutorError::ConfigNotSet { executor: "native" })
    ));

    let mut context = self::context(step(&[("a", 1)], false), false);
    context.config.driver = None;
    assert!(matches!(
        execute_step(&h.executor, context, &Shutdown::new()).await,
        Err(ExecutorError::ConfigNotSet { executor: "driver" })
    ));
    assert_eq!(h.driver.initialized.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_sidecars_observe_the_step() {
    #[derive(Default)]
    struct Counting {
        started: AtomicUsize,
        ended: AtomicUsize,
    }

    #[async_trait]
    impl Sidecar for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        async fn on_step_start(&self, _context: &StepContext) -> Result<(), DriverError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn on_step_end(&self, _context: &StepContext) -> Result<(), DriverError> {
            self.ended.fetch_add(1, Ordering::SeqCst);
            // A failing hook never fails the step
            Err(DriverError::Remote("metrics sink offline".to_string()))
        }
    }

    let sidecar = Arc::new(Counting::default());
    let h = harness(StubDriver::default());
    let executor = h.executor.with_sidecar(Arc::clone(&sidecar) as Arc<dyn Sidecar>);

    execute_step(&executor, context(step(&[("a", 2)], false), false), &Shutdown::new())
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while sidecar.ended.load(Ordering::SeqCst) == 0
            || sidecar.started.load(Ordering::SeqCst) == 0
        {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("sidecar hooks should fire");
    assert_eq!(sidecar.started.load(Ordering::SeqCst), 1);
}

/// Records each hook as it finishes.
struct Ordered {
    events: std::sync::Mutex<Vec<&'static str>>,
    init_delay: Duration,
}

impl Ordered {
    fn new(init_delay: Duration) -> Self {
        Self {
            events: std::sync::Mutex::new(Vec::new()),
            init_delay,
        }
    }

    fn push(&self, event: &'static str) {
        self.events.lock().unwrap().push(event);
    }

    fn events(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().clone()
    }

    async fn wait_for_teardown(&self) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !self.events().contains(&"teardown") {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("sidecar teardown should run");
    }
}

#[async_trait]
impl Sidecar for Ordered {
    fn name(&self) -> &str {
        "ordered"
    }

    async fn initialize(&self) -> Result<(), DriverError> {
        tokio::time::sleep(self.init_delay).await;
        self.push("initialize");
        Ok(())
    }

    async fn on_step_start(&self, _context: &StepContext) -> Result<(), DriverError> {
        self.push("start");
        Ok(())
    }

    async fn on_step_end(&self, _context: &StepContext) -> Result<(), DriverError> {
        self.push("end");
        Ok(())
    }

    async fn teardown(&self) -> Result<(), DriverError> {
        self.push("teardown");
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sidecar_hooks_run_in_order() {
    let sidecar = Arc::new(Ordered::new(Duration::from_millis(100)));
    let h = harness(StubDriver::default());
    let executor = h.executor.with_sidecar(Arc::clone(&sidecar) as Arc<dyn Sidecar>);

    execute_step(&executor, context(step(&[("a", 1)], false), false), &Shutdown::new())
        .await
        .unwrap();

    sidecar.wait_for_teardown().await;
    assert_eq!(sidecar.events(), vec!["initialize", "start", "end", "teardown"]);
}

#[tokio::test]
async fn test_sidecars_torn_down_when_initialize_fails() {
    let sidecar = Arc::new(Ordered::new(Duration::ZERO));
    let h = harness(StubDriver {
        fail_initialize: true,
        ..Default::default()
    });
    let executor = h.executor.with_sidecar(Arc::clone(&sidecar) as Arc<dyn Sidecar>);

    let err = execute_step(&executor, context(step(&[("a", 1)], false), false), &Shutdown::new())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Driver error: database unreachable");
    assert_eq!(h.driver.torn_down.load(Ordering::SeqCst), 0);

    sidecar.wait_for_teardown().await;
    assert_eq!(sidecar.events(), vec!["initialize", "start", "end", "teardown"]);
}
