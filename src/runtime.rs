//! Worker offload for hosts that must not block on analysis or execution.
//!
//! The pipeline and the engine are synchronous. [`ServiceRuntime`] runs
//! requests on two bounded thread pools, one per [`Lane`], so a backlog of slow
//! analyses (reasoning backends can take seconds) never delays plan execution.
//! Submission never blocks: a full lane rejects the request with
//! [`DispatchError::QueueFull`].

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::debug;

use crate::config::RuntimeConfig;
use crate::error::{DispatchError, RuleflowError, RuleflowResult};
use crate::execution::ExecutionSummary;
use crate::pipeline::Decision;
use crate::rule::{JsonMap, Rule};
use crate::service::{AnalysisExecution, RuleService};

/// Worker pool selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lane {
    /// Scenario analysis.
    Analysis,
    /// Plan execution.
    Execution,
}

impl Lane {
    /// Lowercase lane name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::Execution => "execution",
        }
    }
}

/// A request served by [`ServiceRuntime`].
#[derive(Debug, Clone)]
pub enum ServiceRequest {
    /// [`RuleService::analyze`].
    Analyze {
        /// Scenario text.
        scenario: String,
        /// Optional context.
        context: Option<JsonMap>,
        /// Optional domain hint.
        domain_hint: Option<String>,
        /// Optional category hint.
        category_hint: Option<String>,
    },
    /// [`RuleService::execute`].
    Execute {
        /// Scenario text.
        scenario: String,
        /// Rules in execution order.
        rules: Vec<Rule>,
        /// Context handed to every action.
        context: JsonMap,
    },
    /// [`RuleService::analyze_and_execute`].
    AnalyzeAndExecute {
        /// Scenario text.
        scenario: String,
        /// Optional context.
        context: Option<JsonMap>,
        /// Optional domain hint.
        domain_hint: Option<String>,
        /// Optional category hint.
        category_hint: Option<String>,
    },
}

impl ServiceRequest {
    /// An analysis request without context or hints.
    #[must_use]
    pub fn analyze(scenario: impl Into<String>) -> Self {
        Self::Analyze {
            scenario: scenario.into(),
            context: None,
            domain_hint: None,
            category_hint: None,
        }
    }
}

/// Reply to a [`ServiceRequest`].
#[derive(Debug, Clone)]
pub enum ServiceResponse {
    /// Reply to `Analyze`.
    Decision(Decision),
    /// Reply to `Execute`.
    Execution(ExecutionSummary),
    /// Reply to `AnalyzeAndExecute`.
    AnalysisExecution(Box<AnalysisExecution>),
}

/// Routes requests to a lane.
pub trait RequestRouter: Send + Sync {
    /// Selects the lane for a request.
    fn route(&self, request: &ServiceRequest) -> Lane;
}

/// Analysis work (including analyse-then-execute) goes to the analysis lane;
/// plain execution goes to the execution lane.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultRouter;

impl RequestRouter for DefaultRouter {
    fn route(&self, request: &ServiceRequest) -> Lane {
        match request {
            ServiceRequest::Analyze { .. } | ServiceRequest::AnalyzeAndExecute { .. } => Lane::Analysis,
            ServiceRequest::Execute { .. } => Lane::Execution,
        }
    }
}

fn serve(service: &RuleService, request: ServiceRequest) -> ServiceResponse {
    match request {
        ServiceRequest::Analyze {
            scenario,
            context,
            domain_hint,
            category_hint,
        } => ServiceResponse::Decision(service.analyze(
            &scenario,
            context.as_ref(),
            domain_hint.as_deref(),
            category_hint.as_deref(),
        )),
        ServiceRequest::Execute {
            scenario,
            rules,
            context,
        } => ServiceResponse::Execution(service.execute(&scenario, rules, context)),
        ServiceRequest::AnalyzeAndExecute {
            scenario,
            context,
            domain_hint,
            category_hint,
        } => ServiceResponse::AnalysisExecution(Box::new(service.analyze_and_execute(
            &scenario,
            context.as_ref(),
            domain_hint.as_deref(),
            category_hint.as_deref(),
        ))),
    }
}

enum Job {
    Serve {
        request: ServiceRequest,
        reply: Sender<ServiceResponse>,
    },

    #[cfg(test)]
    Sleep {
        duration: Duration,
        reply: Sender<()>,
    },
}

struct WorkerPool {
    tx: Sender<Job>,
    workers: Vec<JoinHandle<()>>,
    queue_capacity: usize,
}

impl WorkerPool {
    fn start(
        lane: Lane,
        workers: usize,
        queue_capacity: usize,
        service: &Arc<RuleService>,
    ) -> RuleflowResult<Self> {
        let workers = workers.max(1);
        let queue_capacity = queue_capacity.max(1);
        let (tx, rx) = bounded::<Job>(queue_capacity);

        let mut handles = Vec::with_capacity(workers);
        for idx in 0..workers {
            let rx: Receiver<Job> = rx.clone();
            let service = Arc::clone(service);
            let handle = thread::Builder::new()
                .name(format!("ruleflow-{}-{idx}", lane.as_str()))
                .spawn(move || loop {
                    match rx.recv() {
                        Ok(Job::Serve { request, reply }) => {
                            // The caller may have given up waiting.
                            let _ = reply.send(serve(&service, request));
                        }
                        Err(_) => break,

                        #[cfg(test)]
                        Ok(Job::Sleep { duration, reply }) => {
                            thread::sleep(duration);
                            let _ = reply.send(());
                        }
                    }
                })
                .map_err(|e| RuleflowError::internal(format!("failed to spawn {} worker: {e}", lane.as_str())))?;
            handles.push(handle);
        }
        debug!(lane = lane.as_str(), workers, queue_capacity, "worker pool started");

        Ok(Self {
            tx,
            workers: handles,
            queue_capacity,
        })
    }

    fn idle() -> Self {
        Self {
            tx: bounded::<Job>(1).0,
            workers: Vec::new(),
            queue_capacity: 1,
        }
    }

    fn try_submit(&self, job: Job, lane: Lane) -> Result<(), DispatchError> {
        match self.tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(DispatchError::QueueFull {
                lane: lane.as_str().to_string(),
                capacity: self.queue_capacity,
            }),
            Err(TrySendError::Disconnected(_)) => Err(DispatchError::Disconnected {
                lane: lane.as_str().to_string(),
            }),
        }
    }

    fn shutdown(self) {
        // Closing the channel lets workers drain queued jobs, then exit.
        drop(self.tx);
        for handle in self.workers {
            let _ = handle.join();
        }
    }
}

/// Pending reply from [`ServiceRuntime::submit`].
#[derive(Debug)]
pub struct JobHandle {
    lane: Lane,
    rx: Receiver<ServiceResponse>,
}

impl JobHandle {
    /// The lane the request was routed to.
    #[must_use]
    pub const fn lane(&self) -> Lane {
        self.lane
    }

    /// Waits for the reply.
    ///
    /// # Errors
    ///
    /// Fails if the worker went away without replying.
    pub fn join(self) -> Result<ServiceResponse, DispatchError> {
        self.rx.recv().map_err(|_| DispatchError::Disconnected {
            lane: self.lane.as_str().to_string(),
        })
    }

    /// Waits for the reply, at most `timeout`.
    ///
    /// # Errors
    ///
    /// Fails on timeout, or if the worker went away without replying.
    pub fn join_timeout(self, timeout: Duration) -> Result<ServiceResponse, DispatchError> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => DispatchError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            },
            RecvTimeoutError::Disconnected => DispatchError::Disconnected {
                lane: self.lane.as_str().to_string(),
            },
        })
    }
}

/// Runs [`RuleService`] requests on isolated analysis and execution pools.
pub struct ServiceRuntime<R: RequestRouter = DefaultRouter> {
    router: R,
    service: Arc<RuleService>,
    analysis: WorkerPool,
    execution: WorkerPool,
}

impl ServiceRuntime<DefaultRouter> {
    /// Starts a runtime with the default router.
    ///
    /// # Errors
    ///
    /// Fails if a worker thread cannot be spawned.
    pub fn start(service: Arc<RuleService>, config: &RuntimeConfig) -> RuleflowResult<Self> {
        Self::with_router(service, DefaultRouter, config)
    }
}

impl<R: RequestRouter> ServiceRuntime<R> {
    /// Starts a runtime with a custom router.
    ///
    /// # Errors
    ///
    /// Fails if a worker thread cannot be spawned.
    pub fn with_router(service: Arc<RuleService>, router: R, config: &RuntimeConfig) -> RuleflowResult<Self> {
        let analysis = WorkerPool::start(Lane::Analysis, config.analysis_workers, config.queue_capacity, &service)?;
        let execution = WorkerPool::start(Lane::Execution, config.execution_workers, config.queue_capacity, &service)?;
        Ok(Self {
            router,
            service,
            analysis,
            execution,
        })
    }

    /// Queues a request on its lane without blocking.
    ///
    /// # Errors
    ///
    /// Fails with `QueueFull` when the lane is saturated.
    pub fn submit(&self, request: ServiceRequest) -> Result<JobHandle, DispatchError> {
        let lane = self.router.route(&request);
        let (tx, rx) = bounded::<ServiceResponse>(1);
        self.pool(lane).try_submit(Job::Serve { request, reply: tx }, lane)?;
        Ok(JobHandle { lane, rx })
    }

    /// Queues a request and waits for the reply.
    ///
    /// # Errors
    ///
    /// Fails if the request cannot be queued or the worker goes away.
    pub fn call(&self, request: ServiceRequest) -> Result<ServiceResponse, DispatchError> {
        self.submit(request)?.join()
    }

    /// The wrapped service, for direct synchronous calls.
    #[must_use]
    pub fn service(&self) -> &RuleService {
        &self.service
    }

    const fn pool(&self, lane: Lane) -> &WorkerPool {
        match lane {
            Lane::Analysis => &self.analysis,
            Lane::Execution => &self.execution,
        }
    }

    #[cfg(test)]
    fn submit_sleep(&self, lane: Lane, duration: Duration) -> Result<Receiver<()>, DispatchError> {
        let (tx, rx) = bounded::<()>(1);
        self.pool(lane).try_submit(Job::Sleep { duration, reply: tx }, lane)?;
        Ok(rx)
    }
}

impl<R: RequestRouter> Drop for ServiceRuntime<R> {
    fn drop(&mut self) {
        let analysis = std::mem::replace(&mut self.analysis, WorkerPool::idle());
        let execution = std::mem::replace(&mut self.execution, WorkerPool::idle());
        analysis.shutdown();
        execution.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Instant;

    use crate::catalog::InMemoryRuleCatalog;
    use crate::config::ServiceConfig;

    fn service() -> Arc<RuleService> {
        let rules = vec![Rule::new("LOAN_001", "Basic credit review", "approve_basic_review")
            .with_scope("finance", "loan_approval")
            .with_description("Loan with fair credit score")];
        let catalog = Arc::new(InMemoryRuleCatalog::from_rules(rules).unwrap());
        Arc::new(RuleService::offline(catalog, &ServiceConfig::default()))
    }

    fn config(queue_capacity: usize) -> RuntimeConfig {
        RuntimeConfig {
            analysis_workers: 1,
            execution_workers: 1,
            queue_capacity,
        }
    }

    #[test]
    fn test_router_lanes() {
        let router = DefaultRouter;
        assert_eq!(router.route(&ServiceRequest::analyze("s")), Lane::Analysis);
        let execute = ServiceRequest::Execute {
            scenario: "s".into(),
            rules: Vec::new(),
            context: JsonMap::new(),
        };
        assert_eq!(router.route(&execute), Lane::Execution);
    }

    #[test]
    fn test_busy_analysis_lane_does_not_block_execution() {
        let runtime = ServiceRuntime::start(service(), &config(16)).unwrap();
        let sleep = runtime
            .submit_sleep(Lane::Analysis, Duration::from_millis(200))
            .unwrap();

        let rule = runtime.service().rule("LOAN_001").unwrap().unwrap();
        let started = Instant::now();
        let handle = runtime
            .submit(ServiceRequest::Execute {
                scenario: "loan".into(),
                rules: vec![rule],
                context: JsonMap::new(),
            })
            .unwrap();
        assert_eq!(handle.lane(), Lane::Execution);
        let ServiceResponse::Execution(summary) = handle.join_timeout(Duration::from_millis(150)).unwrap() else {
            panic!("expected an execution summary");
        };
        assert_eq!(summary.successful_rules, 1);
        assert!(started.elapsed() < Duration::from_millis(200));

        sleep.recv_timeout(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn test_full_lane_rejects() {
        let runtime = ServiceRuntime::start(service(), &config(1)).unwrap();
        let first = runtime
            .submit_sleep(Lane::Analysis, Duration::from_millis(200))
            .unwrap();
        // Give the worker time to take the first job off the queue.
        thread::sleep(Duration::from_millis(50));
        let second = runtime
            .submit_sleep(Lane::Analysis, Duration::from_millis(10))
            .unwrap();
        let err = runtime.submit(ServiceRequest::analyze("loan")).unwrap_err();
        assert!(matches!(err, DispatchError::QueueFull { capacity: 1, .. }));
        first.recv_timeout(Duration::from_secs(1)).unwrap();
        second.recv_timeout(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn test_call_round_trip() {
        let runtime = ServiceRuntime::start(service(), &RuntimeConfig::default()).unwrap();
        let ServiceResponse::Decision(decision) = runtime.call(ServiceRequest::analyze("fair credit loan")).unwrap() else {
            panic!("expected a decision");
        };
        assert_eq!(decision.scenario, "fair credit loan");
        assert_eq!(runtime.service().decision_history().len(), 1);
    }

    #[test]
    fn test_join_reports_disconnected_when_reply_dropped() {
        let (tx, rx) = bounded::<ServiceResponse>(1);
        drop(tx);
        let handle = JobHandle {
            lane: Lane::Execution,
            rx,
        };
        let err = handle.join_timeout(Duration::from_millis(10)).unwrap_err();
        let DispatchError::Disconnected { lane } = err else {
            panic!("expected Disconnected, got {err:?}");
        };
        assert_eq!(lane, "execution");
    }
}
