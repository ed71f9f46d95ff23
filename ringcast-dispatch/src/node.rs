use std::net::SocketAddr;
use std::sync::Arc;

use ringcast_ring::{
    HashRing,
    LivenessOracle,
    MembershipChange,
    MembershipController,
    MembershipHandle,
    RingStatistics,
};
use ringcast_rpc::{CodecRegistry, Server};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;

use crate::config::NodeConfig;
use crate::dispatcher::Dispatcher;
use crate::error::NodeError;
use crate::http::{serve_sync_records, SyncRecordsEndpoint};
use crate::service::{IngestService, JudgeService, PointSink};
use crate::sync_record::SyncRecords;

/// Builds a node of the dispatch fabric.
///
/// A node given an ingest sink accepts `PushToTrans` batches, stores them
/// locally and forwards them to their judges. A node given a judge sink
/// accepts `PushToJudge` batches. A node may be both.
pub struct RingcastNodeBuilder {
    config: NodeConfig,
    codecs: CodecRegistry,
    ingest_sink: Option<Arc<dyn PointSink>>,
    judge_sink: Option<Arc<dyn PointSink>>,
}

impl RingcastNodeBuilder {
    /// Create a new node builder.
    pub fn new(config: NodeConfig) -> Self {
        Self {
            config,
            codecs: CodecRegistry::default(),
            ingest_sink: None,
            judge_sink: None,
        }
    }

    /// Resolve the configured protocol through a custom codec registry.
    pub fn with_codecs(mut self, codecs: CodecRegistry) -> Self {
        self.codecs = codecs;
        self
    }

    /// Serve `PushToTrans`, storing batches in the given sink.
    pub fn with_ingest_sink(mut self, sink: impl PointSink) -> Self {
        let sink: Arc<dyn PointSink> = Arc::new(sink);
        self.ingest_sink = Some(sink);
        self
    }

    /// Serve `PushToJudge`, evaluating batches with the given sink.
    pub fn with_judge_sink(mut self, sink: impl PointSink) -> Self {
        let sink: Arc<dyn PointSink> = Arc::new(sink);
        self.judge_sink = Some(sink);
        self
    }

    /// Starts the node.
    ///
    /// The ring starts out empty and is populated from the liveness oracle.
    pub async fn start<O>(self, oracle: O) -> Result<RingcastNode, NodeError>
    where
        O: LivenessOracle,
    {
        let codec = self.codecs.get(&self.config.protocol)?;
        let ring = Arc::new(HashRing::new(self.config.ring.clone()));
        let records = SyncRecords::default();

        let rpc_server = Server::listen(self.config.rpc.listen, codec).await?;
        let dispatcher = Arc::new(Dispatcher::new(
            ring.clone(),
            self.config.dispatcher_config(codec),
            records.clone(),
        ));

        if let Some(sink) = self.ingest_sink {
            rpc_server.add_service(IngestService::new(sink, dispatcher.clone()));
        }
        if let Some(sink) = self.judge_sink {
            rpc_server.add_service(JudgeService::new(sink));
        }

        let sync_endpoint = match self.config.sync_listen {
            Some(addr) => Some(serve_sync_records(addr, records.clone()).await?),
            None => None,
        };

        let membership =
            MembershipController::new(ring.clone(), self.config.oracle.clone()).spawn(oracle);
        let membership_task = tokio::spawn(watch_membership_changes(
            dispatcher.clone(),
            membership.change_stream(),
        ));

        info!(
            listen_addr = %rpc_server.local_addr(),
            protocol = %codec,
            replicas = ring.replicas(),
            "Ringcast node started."
        );

        Ok(RingcastNode {
            ring,
            rpc_server,
            dispatcher,
            records,
            membership,
            membership_task,
            sync_endpoint,
        })
    }
}

pub struct RingcastNode {
    ring: Arc<HashRing>,
    rpc_server: Server,
    dispatcher: Arc<Dispatcher>,
    records: SyncRecords,
    membership: MembershipHandle,
    membership_task: JoinHandle<()>,
    sync_endpoint: Option<SyncRecordsEndpoint>,
}

impl RingcastNode {
    #[inline]
    /// The ring maintained by the node's membership controller.
    pub fn ring(&self) -> &Arc<HashRing> {
        &self.ring
    }

    #[inline]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    #[inline]
    pub fn records(&self) -> &SyncRecords {
        &self.records
    }

    #[inline]
    /// The address of the node's RPC server.
    pub fn rpc_addr(&self) -> SocketAddr {
        self.rpc_server.local_addr()
    }

    #[inline]
    /// The address of the sync-record endpoint, if it was started.
    pub fn sync_addr(&self) -> Option<SocketAddr> {
        self.sync_endpoint.as_ref().map(|e| e.local_addr())
    }

    #[inline]
    /// Gets the live membership statistics.
    pub fn ring_statistics(&self) -> RingStatistics {
        self.membership.statistics()
    }

    #[inline]
    /// Get a stream of membership changes.
    pub fn membership_changes(&self) -> WatchStream<MembershipChange> {
        self.membership.change_stream()
    }

    /// Shuts down the node and cleans up any connections.
    pub fn shutdown(self) {
        self.membership.shutdown();
        self.membership_task.abort();
        self.rpc_server.shutdown();
        if let Some(endpoint) = self.sync_endpoint.as_ref() {
            endpoint.shutdown();
        }
        for owner in self.dispatcher.network().owners() {
            self.dispatcher.network().disconnect(&owner);
        }
        info!(listen_addr = %self.rpc_server.local_addr(), "Ringcast node shut down.");
    }
}

async fn watch_membership_changes(
    dispatcher: Arc<Dispatcher>,
    mut changes: WatchStream<MembershipChange>,
) {
    while let Some(change) = changes.next().await {
        if change.is_empty() {
            continue;
        }

        for node in change.joined.iter() {
            info!(node = %node, version = change.version, "Member has joined the ring.");
        }

        for node in change.left.iter() {
            info!(node = %node, version = change.version, "Member has left the ring.");
        }

        dispatcher.apply_membership_change(&change);
    }
}
