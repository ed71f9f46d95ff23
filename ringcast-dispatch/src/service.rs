use std::sync::Arc;

use async_trait::async_trait;
use ringcast_rpc::{Handler, Request, RpcService, ServiceRegistry, Status};
use serde::{Deserialize, Serialize};

use crate::dispatcher::Dispatcher;
use crate::point::MetricPoint;

pub const PUSH_TO_TRANS: &str = "PushToTrans";
pub const PUSH_TO_JUDGE: &str = "PushToJudge";

#[async_trait]
/// A consumer of metric points living outside of the dispatch fabric.
///
/// Typically this is the local storage pipeline or the rule evaluator.
pub trait PointSink: Send + Sync + 'static {
    async fn push(&self, points: Vec<MetricPoint>) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
/// A batch of points to store.
pub struct PushToTrans {
    pub points: Vec<MetricPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
/// A batch of points to evaluate.
pub struct PushToJudge {
    pub points: Vec<MetricPoint>,
}

/// Accepts ingested batches.
///
/// Every batch is handed to the local sink and fanned out to the judges
/// owning its points. Only the local sink decides the reply.
pub struct IngestService {
    sink: Arc<dyn PointSink>,
    dispatcher: Arc<Dispatcher>,
}

impl IngestService {
    pub fn new(sink: Arc<dyn PointSink>, dispatcher: Arc<Dispatcher>) -> Self {
        Self { sink, dispatcher }
    }
}

impl RpcService for IngestService {
    fn register_handlers(registry: &mut ServiceRegistry<Self>) {
        registry.add_handler::<PushToTrans>();
    }
}

#[async_trait]
impl Handler<PushToTrans> for IngestService {
    type Reply = ();

    fn method() -> &'static str {
        PUSH_TO_TRANS
    }

    async fn on_message(&self, msg: Request<PushToTrans>) -> Result<Self::Reply, Status> {
        let remote_addr = msg.remote_addr();
        let points = msg.into_inner().points;
        let num_points = points.len();

        let (stored, dispatched) = tokio::join!(
            self.sink.push(points.clone()),
            self.dispatcher.dispatch(points),
        );

        if let Err(e) = dispatched {
            warn!(
                remote_addr = %remote_addr,
                num_points = num_points,
                error = %e,
                "Failed to forward ingested points to the judges."
            );
        }

        stored.map_err(|e| {
            error!(
                remote_addr = %remote_addr,
                num_points = num_points,
                error = ?e,
                "Failed to store ingested points."
            );
            Status::internal(e.to_string())
        })
    }
}

/// Accepts batches for evaluation.
///
/// The reply is sent as soon as the batch is handed off, evaluation itself
/// happens in the background.
pub struct JudgeService {
    sink: Arc<dyn PointSink>,
}

impl JudgeService {
    pub fn new(sink: Arc<dyn PointSink>) -> Self {
        Self { sink }
    }
}

impl RpcService for JudgeService {
    fn register_handlers(registry: &mut ServiceRegistry<Self>) {
        registry.add_handler::<PushToJudge>();
    }
}

#[async_trait]
impl Handler<PushToJudge> for JudgeService {
    type Reply = ();

    fn method() -> &'static str {
        PUSH_TO_JUDGE
    }

    async fn on_message(&self, msg: Request<PushToJudge>) -> Result<Self::Reply, Status> {
        let remote_addr = msg.remote_addr();
        let points = msg.into_inner().points;
        let sink = self.sink.clone();

        tokio::spawn(async move {
            let num_points = points.len();
            if let Err(e) = sink.push(points).await {
                warn!(
                    remote_addr = %remote_addr,
                    num_points = num_points,
                    error = ?e,
                    "Failed to evaluate points."
                );
            }
        });

        Ok(())
    }
}
