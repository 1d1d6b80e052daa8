use std::sync::Barrier;
use std::thread;
use std::time::Duration;

use tandem::active_object::{MethodRequest, MstProxy, Promise, Scheduler, SchedulerState, Servant};
use tandem::config::{GuardPolicy, SchedulerConfig};
use tandem::error::{ExecutionError, SystemError, TaskError};

const WAIT: Duration = Duration::from_secs(5);

// Servant that records the order in which requests ran
#[derive(Debug, Default)]
struct Recorder {
    log: Vec<u32>,
    open: bool,
    generation: u64,
}

impl Servant for Recorder {
    fn generation(&self) -> u64 {
        self.generation
    }
}

enum Step {
    Record(u32),
    /// Runs only once `Open` has executed
    Gated(u32),
    Open,
    /// Replies with the log once it holds at least `min_len` entries
    Snapshot { min_len: usize, reply: Promise<Vec<u32>> },
    Fail,
    Explode,
}

impl MethodRequest<Recorder> for Step {
    fn name(&self) -> &'static str {
        match self {
            Step::Record(_) => "Record",
            Step::Gated(_) => "Gated",
            Step::Open => "Open",
            Step::Snapshot { .. } => "Snapshot",
            Step::Fail => "Fail",
            Step::Explode => "Explode",
        }
    }

    fn guard(&self, servant: &Recorder) -> bool {
        match self {
            Step::Gated(_) => servant.open,
            Step::Snapshot { min_len, .. } => servant.log.len() >= *min_len,
            _ => true,
        }
    }

    fn call(self, servant: &mut Recorder) -> Result<(), ExecutionError> {
        match self {
            Step::Record(id) | Step::Gated(id) => {
                servant.log.push(id);
                servant.generation += 1;
            }
            Step::Open => {
                servant.open = true;
                servant.generation += 1;
            }
            Step::Snapshot { reply, .. } => {
                let _ = reply.set(servant.log.clone());
            }
            Step::Fail => return Err(ExecutionError::Panicked("deliberate failure".to_string())),
            Step::Explode => panic!("deliberate panic"),
        }
        Ok(())
    }
}

fn scheduler(policy: GuardPolicy) -> Scheduler<Recorder, Step> {
    let scheduler = Scheduler::new(
        Recorder::default(),
        SchedulerConfig {
            guard_policy: policy,
            thread_name: "recorder-scheduler".to_string(),
            ..Default::default()
        },
    )
    .unwrap();
    scheduler.start().unwrap();
    scheduler
}

fn snapshot(scheduler: &Scheduler<Recorder, Step>, min_len: usize) -> Vec<u32> {
    let (reply, future) = Promise::new();
    scheduler.enqueue(Step::Snapshot { min_len, reply }).unwrap();
    future.get_timeout(WAIT).expect("snapshot timed out").unwrap()
}

fn build_square(proxy: &MstProxy) {
    // 0 -5- 1 -3- 2 -2- 3, plus a 0-3 chord of 9
    proxy.init_graph(4);
    proxy.add_edge(0, 1, 5);
    proxy.add_edge(1, 2, 3);
    proxy.add_edge(2, 3, 2);
    proxy.add_edge(0, 3, 9);
}

// Test the full proxy round trip with both algorithms
#[test]
fn test_proxy_end_to_end() {
    for algorithm in ["kruskal", "Prim"] {
        let proxy = MstProxy::new().unwrap();
        build_square(&proxy);

        let mst = proxy.compute_mst(algorithm).get().unwrap();
        assert_eq!(mst.total_weight(), 10);
        assert_eq!(proxy.get_weight().get(), Ok(10));
        assert_eq!(proxy.get_longest_dist().get(), Ok(10));
        assert_eq!(proxy.get_avg_dist().get(), Ok(5.5));

        let mut graph = tandem_api::Graph::new(4);
        graph.add_edge(0, 1, 5).unwrap();
        graph.add_edge(1, 2, 3).unwrap();
        graph.add_edge(2, 3, 2).unwrap();
        graph.add_edge(0, 3, 9).unwrap();
        assert_eq!(proxy.get_shortest_dist(graph, 0, 3).get(), Ok(10));
    }
}

// Test that a query waits until its precondition holds
#[test]
fn test_query_waits_for_mst() {
    let proxy = MstProxy::new().unwrap();
    let weight = proxy.get_weight();
    assert_eq!(weight.get_timeout(Duration::from_millis(100)), None);

    build_square(&proxy);
    assert_eq!(weight.get_timeout(Duration::from_millis(100)), None);

    let _mst = proxy.compute_mst("kruskal");
    assert_eq!(weight.get_timeout(WAIT), Some(Ok(10)));
    assert!(proxy.stats().deferred >= 1);
}

// Test that edits after a computation are seen by the next one
#[test]
fn test_remove_edge_then_recompute() {
    let proxy = MstProxy::new().unwrap();
    build_square(&proxy);
    assert_eq!(proxy.compute_mst("prim").get().map(|m| m.total_weight()), Ok(10));

    proxy.remove_edge(1, 2);
    let mst = proxy.compute_mst("prim").get().unwrap();
    assert_eq!(mst.total_weight(), 16);
}

// Test that execution failures reach the future
#[test]
fn test_unknown_algorithm_fails_future() {
    let proxy = MstProxy::new().unwrap();
    proxy.init_graph(2);
    let result = proxy.compute_mst("boruvka").get();
    assert_eq!(
        result.map(|m| m.total_weight()),
        Err(TaskError::Execution("Unknown MST algorithm: boruvka".to_string()))
    );
}

// Test that rejected edits fail on the dispatch thread without blocking later queries
#[test]
fn test_rejected_edits_keep_proxy_responsive() {
    let proxy = MstProxy::new().unwrap();
    proxy.init_graph(3);
    proxy.add_edge(0, 1, -4);
    proxy.init_graph(usize::MAX);
    let _mst = proxy.compute_mst("kruskal");

    let graph = tandem_api::Graph::new(3);
    assert_eq!(proxy.get_shortest_dist(graph, 0, 2).get_timeout(WAIT), Some(Ok(-1)));
    assert_eq!(proxy.get_weight().get_timeout(WAIT), Some(Ok(0)));
    assert_eq!(proxy.stats().failed, 2);
}

// Test describe before and after a graph exists
#[test]
fn test_describe() {
    let proxy = MstProxy::new().unwrap();
    assert_eq!(proxy.describe().get(), Ok("No graph initialized\n".to_string()));

    proxy.init_graph(2);
    proxy.add_edge(0, 1, 7);
    let _mst = proxy.compute_mst("kruskal");
    let text = proxy.describe().get().unwrap();
    assert!(text.starts_with("Graph with 2 vertices and 1 edges:\n"));
    assert!(text.contains("Total weight: 7\n"));
}

// Test that shutdown resolves parked futures instead of hanging them
#[test]
fn test_shutdown_abandons_pending_futures() {
    let proxy = MstProxy::new().unwrap();
    let weight = proxy.get_weight();
    proxy.shutdown().unwrap();

    assert_eq!(weight.get(), Err(TaskError::Abandoned));
    assert_eq!(proxy.state(), SchedulerState::Stopped);
    assert_eq!(proxy.get_longest_dist().get(), Err(TaskError::Abandoned));
}

// Test that parked requests run in arrival order once their guard holds
#[test]
fn test_park_policy_preserves_fifo() {
    let scheduler = scheduler(GuardPolicy::Park);
    scheduler.enqueue(Step::Gated(1)).unwrap();
    scheduler.enqueue(Step::Gated(2)).unwrap();
    scheduler.enqueue(Step::Record(3)).unwrap();
    scheduler.enqueue(Step::Open).unwrap();

    assert_eq!(snapshot(&scheduler, 3), vec![3, 1, 2]);
    assert_eq!(scheduler.stats().deferred, 2);
    scheduler.stop().unwrap();
}

// Test that requeued requests eventually run
#[test]
fn test_requeue_policy_eventually_runs() {
    let scheduler = scheduler(GuardPolicy::Requeue {
        backoff: Duration::from_millis(1),
    });
    scheduler.enqueue(Step::Gated(1)).unwrap();
    scheduler.enqueue(Step::Record(2)).unwrap();
    scheduler.enqueue(Step::Open).unwrap();

    assert_eq!(snapshot(&scheduler, 2), vec![2, 1]);
    assert!(scheduler.stats().retried >= 1);
    scheduler.stop().unwrap();
}

// Test that a requeue on a full bounded queue does not deadlock
#[test]
fn test_requeue_on_full_queue() {
    let scheduler = Scheduler::new(
        Recorder::default(),
        SchedulerConfig {
            queue_capacity: Some(1),
            guard_policy: GuardPolicy::Requeue {
                backoff: Duration::from_millis(1),
            },
            ..Default::default()
        },
    )
    .unwrap();
    scheduler.start().unwrap();

    for id in 0..5 {
        scheduler.enqueue(Step::Gated(id)).unwrap();
    }
    scheduler.enqueue(Step::Open).unwrap();

    let mut log = snapshot(&scheduler, 5);
    log.sort_unstable();
    assert_eq!(log, vec![0, 1, 2, 3, 4]);
    scheduler.stop().unwrap();
}

// Test that failing and panicking requests do not stop the dispatch thread
#[test]
fn test_failures_are_contained() {
    let scheduler = scheduler(GuardPolicy::Park);
    scheduler.enqueue(Step::Fail).unwrap();
    scheduler.enqueue(Step::Explode).unwrap();
    scheduler.enqueue(Step::Record(9)).unwrap();

    assert_eq!(snapshot(&scheduler, 1), vec![9]);
    scheduler.stop().unwrap();

    let stats = scheduler.stats();
    assert_eq!(stats.failed, 2);
    // Record and Snapshot
    assert_eq!(stats.executed, 2);
}

// Test lifecycle: enqueue needs a running scheduler and the servant survives a restart
#[test]
fn test_lifecycle() {
    let scheduler = scheduler(GuardPolicy::Park);
    assert!(matches!(scheduler.start(), Err(SystemError::AlreadyRunning)));
    scheduler.enqueue(Step::Record(1)).unwrap();
    assert_eq!(snapshot(&scheduler, 1), vec![1]);

    scheduler.stop().unwrap();
    scheduler.stop().unwrap();
    assert_eq!(scheduler.state(), SchedulerState::Stopped);
    assert!(matches!(scheduler.enqueue(Step::Record(2)), Err(SystemError::NotRunning)));
    assert_eq!(scheduler.with_servant(|s| s.log.clone()), Some(vec![1]));

    scheduler.start().unwrap();
    scheduler.enqueue(Step::Record(3)).unwrap();
    assert_eq!(snapshot(&scheduler, 2), vec![1, 3]);
}

// Test that invalid configuration is rejected up front
#[test]
fn test_zero_capacity_rejected() {
    let result = Scheduler::<Recorder, Step>::new(
        Recorder::default(),
        SchedulerConfig {
            queue_capacity: Some(0),
            ..Default::default()
        },
    );
    assert!(matches!(result, Err(SystemError::InvalidConfig(_))));
}

// Test that requests racing a stop are either run or abandoned, never left pending
#[test]
fn test_stop_racing_producers_resolves_every_future() {
    for capacity in [None, Some(2)] {
        for _ in 0..50 {
            let scheduler = Scheduler::new(
                Recorder::default(),
                SchedulerConfig {
                    queue_capacity: capacity,
                    ..Default::default()
                },
            )
            .unwrap();
            scheduler.start().unwrap();
            let barrier = Barrier::new(5);
            let (scheduler, barrier) = (&scheduler, &barrier);

            let futures: Vec<_> = thread::scope(|scope| {
                let producers: Vec<_> = (0..4)
                    .map(|_| {
                        scope.spawn(move || {
                            barrier.wait();
                            (0..50)
                                .map(|_| {
                                    let (reply, future) = Promise::new();
                                    let _ = scheduler.enqueue(Step::Snapshot { min_len: 0, reply });
                                    future
                                })
                                .collect::<Vec<_>>()
                        })
                    })
                    .collect();
                barrier.wait();
                scheduler.stop().unwrap();
                producers.into_iter().flat_map(|p| p.join().unwrap()).collect()
            });

            assert_eq!(scheduler.queue_len(), 0);
            for future in futures {
                match future.get_timeout(Duration::from_millis(200)) {
                    Some(Ok(_)) | Some(Err(TaskError::Abandoned)) => {}
                    other => panic!("future not resolved after stop: {:?}", other),
                }
            }
        }
    }
}
