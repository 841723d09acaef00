use futures::future::BoxFuture;
use graphserve::ops::{DistOps, LocalOps};
use graphserve::rpc::{InProcessTransport, RpcHandler, RpcRequest, RpcResponse, Transport};
use graphserve::server::GraphService;
use graphserve::shard::shard_of;
use graphserve::{
    make_node, namespace_of, CacheKind, Context, Error, Feature, GraphClient, GraphConfig,
    InMemoryGraph, NamespaceTable, NodeId, SamplingKind, WalkerInfo,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const USERS: u64 = 12;

fn item(i: u64) -> NodeId {
    make_node(1, i)
}

/// Users form a ring and each points at its item; items point back at two
/// users. Node 100 leads to 101, which has no context of its own.
fn edges() -> Vec<(NodeId, Context)> {
    let mut edges = Vec::new();
    for i in 0..USERS {
        edges.push((i, vec![((i + 1) % USERS, 1.0), (item(i), 2.0)]));
        edges.push((item(i), vec![(i, 1.0), ((i + 1) % USERS, 3.0)]));
    }
    edges.push((100, vec![(101, 1.0)]));
    edges
}

fn node_feature(node: NodeId) -> Option<Feature> {
    (node % 3 == 0 && node < USERS).then(|| vec![(node, node as f32 * 0.5)])
}

fn build_graph(shard: Option<(usize, usize)>) -> InMemoryGraph {
    let namespaces = NamespaceTable::from_pairs([("user", 0), ("item", 1)]).unwrap();
    let mut builder = InMemoryGraph::builder(namespaces);
    for (node, context) in edges() {
        if let Some((id, count)) = shard {
            if shard_of(node, count).unwrap() != id {
                continue;
            }
        }
        if let Some(feature) = node_feature(node) {
            builder.add_node_feature(node, feature);
            builder.add_neighbor_feature(node, vec![(node + 1, 1.0)]);
        }
        builder.add_context(node, context);
    }
    builder.build().unwrap()
}

fn shard_config(shard_num: usize, shard_id: usize) -> GraphConfig {
    GraphConfig {
        shard_num,
        shard_id,
        thread_num: 2,
        neighbor_sampler: SamplingKind::PartialSum,
        enable_meta_path: true,
        cache_type: CacheKind::Degree,
        cache_thld: 0.5,
        max_node_per_rpc: 3,
        rpc_timeout_ms: 5_000,
        ..GraphConfig::default()
    }
}

fn services(shard_num: usize) -> Vec<Arc<GraphService>> {
    (0..shard_num)
        .map(|id| {
            let graph = Arc::new(build_graph(Some((id, shard_num))));
            let ops = LocalOps::new(graph, &shard_config(shard_num, id)).unwrap();
            Arc::new(GraphService::new(ops))
        })
        .collect()
}

fn transport(services: &[Arc<GraphService>]) -> Arc<InProcessTransport> {
    let handlers: Vec<Arc<dyn RpcHandler>> = services
        .iter()
        .map(|s| s.clone() as Arc<dyn RpcHandler>)
        .collect();
    Arc::new(InProcessTransport::new(handlers))
}

async fn cluster(shard_num: usize) -> DistOps {
    let services = services(shard_num);
    DistOps::connect(transport(&services), &shard_config(shard_num, 0))
        .await
        .unwrap()
}

fn is_edge(from: NodeId, to: NodeId) -> bool {
    edges()
        .iter()
        .any(|(node, context)| *node == from && context.iter().any(|p| p.0 == to))
}

/// Delays every shard by a different amount so responses arrive out of
/// shard order.
struct SkewedTransport {
    inner: Arc<InProcessTransport>,
}

impl Transport for SkewedTransport {
    fn shard_count(&self) -> usize {
        self.inner.shard_count()
    }

    fn call(&self, shard: usize, request: RpcRequest) -> BoxFuture<'_, graphserve::Result<RpcResponse>> {
        let delay = Duration::from_millis(((self.shard_count() - shard) * 7) as u64);
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            self.inner.call(shard, request).await
        })
    }
}

/// Shard 1 stops answering once `hang` is set.
struct StallingTransport {
    inner: Arc<InProcessTransport>,
    hang: AtomicBool,
}

impl Transport for StallingTransport {
    fn shard_count(&self) -> usize {
        self.inner.shard_count()
    }

    fn call(&self, shard: usize, request: RpcRequest) -> BoxFuture<'_, graphserve::Result<RpcResponse>> {
        if shard == 1 && self.hang.load(Ordering::SeqCst) {
            return Box::pin(futures::future::pending::<graphserve::Result<RpcResponse>>());
        }
        self.inner.call(shard, request)
    }
}

/// Counts cache-node page requests per shard.
struct PageCountingTransport {
    inner: Arc<InProcessTransport>,
    pages: Vec<AtomicUsize>,
}

impl PageCountingTransport {
    fn new(inner: Arc<InProcessTransport>) -> Self {
        let pages = (0..inner.shard_count()).map(|_| AtomicUsize::new(0)).collect();
        PageCountingTransport { inner, pages }
    }

    fn reset(&self) {
        self.pages.iter().for_each(|p| p.store(0, Ordering::SeqCst));
    }

    fn pages(&self) -> Vec<usize> {
        self.pages.iter().map(|p| p.load(Ordering::SeqCst)).collect()
    }
}

impl Transport for PageCountingTransport {
    fn shard_count(&self) -> usize {
        self.inner.shard_count()
    }

    fn call(&self, shard: usize, request: RpcRequest) -> BoxFuture<'_, graphserve::Result<RpcResponse>> {
        if matches!(request, RpcRequest::CacheNodeLookup(_)) {
            self.pages[shard].fetch_add(1, Ordering::SeqCst);
        }
        self.inner.call(shard, request)
    }
}

fn cache_node_count(service: &GraphService) -> usize {
    service.ops().cache_node_lookup(0, usize::MAX).unwrap().len()
}

#[tokio::test]
async fn test_connect_reads_cluster_meta() {
    let ops = cluster(3).await;
    assert_eq!(ops.shard_count(), 3);
    assert_eq!(ops.ns_size(), 2);
    assert_eq!(ops.max_node_per_rpc(), 3);
    assert!(!ops.cache().is_empty());
}

#[tokio::test]
async fn test_context_matches_local_order() {
    let ops = cluster(3).await;
    let local = build_graph(None);
    let nodes: Vec<NodeId> = vec![item(4), 7, 999, 0, item(11), 5, 100];
    let contexts = ops.lookup_context(&nodes).await.unwrap();
    for (node, context) in nodes.iter().zip(&contexts) {
        let expected = local.find_context(*node).map(|c| c.to_vec()).unwrap_or_default();
        assert_eq!(context, &expected, "node {}", node);
    }
    assert!(contexts[2].is_empty());

    let err = ops.lookup_context(&[999, 1001]).await;
    assert!(matches!(err, Err(Error::Data(_))));
}

#[tokio::test]
async fn test_permuted_arrival_keeps_input_order() {
    let services = services(3);
    let skewed = Arc::new(SkewedTransport {
        inner: transport(&services),
    });
    let ops = DistOps::connect(skewed, &shard_config(3, 0)).await.unwrap();
    let nodes: Vec<NodeId> = (0..USERS).rev().chain((0..USERS).map(item)).collect();

    let contexts = ops.lookup_context(&nodes).await.unwrap();
    let local = build_graph(None);
    for (node, context) in nodes.iter().zip(&contexts) {
        assert_eq!(context.as_slice(), local.find_context(*node).unwrap());
    }

    let neighbors = ops.sample_neighbor(-1, &nodes).await.unwrap();
    for (node, list) in nodes.iter().zip(&neighbors) {
        let expected: Vec<NodeId> = local.find_context(*node).unwrap().iter().map(|p| p.0).collect();
        assert_eq!(list, &expected);
    }
}

#[tokio::test]
async fn test_features_and_cache_agree_with_shards() {
    let ops = cluster(3).await;
    let nodes: Vec<NodeId> = (0..USERS).chain([item(2), 555]).collect();
    let (node_feats, neigh_feats) = ops.lookup_feature(&nodes).await.unwrap();
    let node_only = ops.lookup_node_feature(&nodes).await.unwrap();
    let neigh_only = ops.lookup_neighbor_feature(&nodes).await.unwrap();

    for (i, &node) in nodes.iter().enumerate() {
        let expected = node_feature(node).unwrap_or_else(|| vec![(0, 0.0)]);
        assert_eq!(node_feats[i], expected, "node {}", node);
        assert_eq!(node_only[i], expected, "node {}", node);
        assert_eq!(neigh_feats[i], neigh_only[i]);
    }
    assert_eq!(neigh_feats[3], vec![(4, 1.0)]);
}

#[tokio::test]
async fn test_cache_scan_is_complete_and_unique() {
    let services = services(3);
    let ops = DistOps::connect(transport(&services), &shard_config(3, 0))
        .await
        .unwrap();
    let scanned = ops.scan_cache_nodes().await.unwrap();

    let mut expected = HashSet::new();
    for service in &services {
        expected.extend(service.ops().cache_node_lookup(0, usize::MAX).unwrap());
    }
    let unique: HashSet<NodeId> = scanned.iter().copied().collect();
    assert_eq!(unique.len(), scanned.len());
    assert_eq!(unique, expected);

    for &node in &scanned {
        assert!(ops.cache().find_node_feature(node).is_some());
    }
}

#[tokio::test]
async fn test_cache_scan_round_bound() {
    let services = services(3);
    let counting = Arc::new(PageCountingTransport::new(transport(&services)));
    let ops = DistOps::connect(counting.clone(), &shard_config(3, 0))
        .await
        .unwrap();
    counting.reset();
    ops.scan_cache_nodes().await.unwrap();

    let page = ops.max_node_per_rpc();
    let counts: Vec<usize> = services.iter().map(|s| cache_node_count(s)).collect();
    let pages = counting.pages();
    // A shard stops after its first short page.
    for (shard, &count) in counts.iter().enumerate() {
        assert_eq!(pages[shard], count / page + 1, "shard {} with {} nodes", shard, count);
    }
    let max_count = counts.iter().copied().max().unwrap();
    let rounds = pages.iter().copied().max().unwrap();
    assert!(rounds <= max_count.div_ceil(page) + 1);
}

#[tokio::test]
async fn test_cache_scan_exact_page_multiple() {
    let graph = Arc::new(build_graph(None));
    let sizing = LocalOps::new(graph.clone(), &shard_config(1, 0)).unwrap();
    let count = sizing.cache_node_lookup(0, usize::MAX).unwrap().len();
    assert!(count > 0);

    // One shard whose cache holds exactly one full page.
    let config = GraphConfig {
        max_node_per_rpc: count,
        ..shard_config(1, 0)
    };
    let services = vec![Arc::new(GraphService::new(LocalOps::new(graph, &config).unwrap()))];
    let counting = Arc::new(PageCountingTransport::new(transport(&services)));
    let ops = DistOps::connect(counting.clone(), &config).await.unwrap();
    counting.reset();

    let scanned = ops.scan_cache_nodes().await.unwrap();
    assert_eq!(scanned.len(), count);
    // The full page is followed by one empty page.
    assert_eq!(counting.pages(), vec![2]);
    assert_eq!(ops.cache().len(), count);
}

#[tokio::test]
async fn test_disabled_cache_stays_empty() {
    let services: Vec<Arc<GraphService>> = (0..2)
        .map(|id| {
            let config = GraphConfig {
                cache_thld: 0.0,
                ..shard_config(2, id)
            };
            let graph = Arc::new(build_graph(Some((id, 2))));
            Arc::new(GraphService::new(LocalOps::new(graph, &config).unwrap()))
        })
        .collect();
    let ops = DistOps::connect(transport(&services), &shard_config(2, 0))
        .await
        .unwrap();
    assert!(ops.cache().is_empty());
    assert!(ops.scan_cache_nodes().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_page_size_mismatch_fails_connect() {
    let services: Vec<Arc<GraphService>> = (0..2)
        .map(|id| {
            let config = GraphConfig {
                max_node_per_rpc: 3 + id,
                ..shard_config(2, id)
            };
            let graph = Arc::new(build_graph(Some((id, 2))));
            Arc::new(GraphService::new(LocalOps::new(graph, &config).unwrap()))
        })
        .collect();
    let result = DistOps::connect(transport(&services), &shard_config(2, 0)).await;
    assert!(matches!(result, Err(Error::Config(_))));
}

#[tokio::test]
async fn test_walk_crosses_shards() {
    let ops = cluster(3).await;
    let starts: Vec<NodeId> = vec![0, 5, item(7), 3];
    let lens = vec![9, 4, 6, 1];
    let paths = ops
        .static_traverse(&starts, &lens, &WalkerInfo::default())
        .await
        .unwrap();
    for ((path, &start), &len) in paths.iter().zip(&starts).zip(&lens) {
        assert_eq!(path.len(), len);
        assert_eq!(path[0], start);
        for pair in path.windows(2) {
            assert!(is_edge(pair[0], pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }
}

#[tokio::test]
async fn test_meta_path_walk_keeps_phase_across_shards() {
    let ops = cluster(3).await;
    let info = WalkerInfo::with_meta_path(vec![0, 1]);
    let paths = ops.static_traverse(&[0, 4, 9], &[7, 7, 7], &info).await.unwrap();
    for path in paths {
        assert_eq!(path.len(), 7);
        for (step, node) in path.iter().enumerate() {
            assert_eq!(namespace_of(*node) as usize, step % 2, "{:?}", path);
        }
    }
}

#[tokio::test]
async fn test_walk_from_isolated_node_fails() {
    let ops = cluster(3).await;
    let err = ops
        .static_traverse(&[0, 101], &[4, 4], &WalkerInfo::default())
        .await;
    assert!(matches!(err, Err(Error::Data(_))));

    // A dead end after the first hop only shortens that walk.
    let paths = ops
        .static_traverse(&[100], &[4], &WalkerInfo::default())
        .await
        .unwrap();
    assert_eq!(paths[0], vec![100, 101]);
}

#[tokio::test]
async fn test_shared_negative_splits_across_shards() {
    let ops = cluster(3).await;
    let excluded: Vec<NodeId> = vec![1, 2, item(3)];
    let sampled = ops
        .shared_sample_negative(5, &[0, 7, item(1)], &excluded)
        .await
        .unwrap();
    assert_eq!(sampled.len(), 2);
    for (ns, pool) in sampled.iter().enumerate() {
        assert_eq!(pool.len(), 5);
        assert!(pool.iter().all(|n| namespace_of(*n) as usize == ns));
        assert!(pool.iter().all(|n| !excluded.contains(n)));
    }

    let users_only = ops.shared_sample_negative(3, &[4], &[]).await.unwrap();
    assert_eq!(users_only[0].len(), 3);
    assert!(users_only[1].is_empty());
}

#[tokio::test]
async fn test_indep_negative_parallel_to_input() {
    let ops = cluster(3).await;
    let nodes = [item(5), 0, 8];
    let sampled = ops.indep_sample_negative(4, &nodes, &[0]).await.unwrap();
    assert_eq!(sampled.len(), 3);
    for (node, pool) in nodes.iter().zip(&sampled) {
        assert_eq!(pool.len(), 4);
        assert!(pool.iter().all(|n| namespace_of(*n) == namespace_of(*node)));
        assert!(!pool.contains(&0));
    }
}

#[tokio::test]
async fn test_neighbor_sample_missing_nodes() {
    let ops = cluster(2).await;
    let lists = ops.sample_neighbor(1, &[999, 3]).await.unwrap();
    assert!(lists[0].is_empty());
    assert_eq!(lists[1].len(), 1);
    assert!(matches!(
        ops.sample_neighbor(2, &[999, 1001]).await,
        Err(Error::Data(_))
    ));
}

#[tokio::test]
async fn test_stalled_shard_times_out() {
    let services = services(2);
    let stalling = Arc::new(StallingTransport {
        inner: transport(&services),
        hang: AtomicBool::new(false),
    });
    let config = GraphConfig {
        rpc_timeout_ms: 50,
        ..shard_config(2, 0)
    };
    let ops = DistOps::connect(stalling.clone(), &config).await.unwrap();
    stalling.hang.store(true, Ordering::SeqCst);

    // Odd ids route to shard 1 and are never cached.
    let err = ops.lookup_node_feature(&[999, 2, 1001]).await;
    assert!(matches!(err, Err(Error::Rpc(_))));
    // Shard 0 only: still fine.
    let feats = ops.lookup_node_feature(&[2, 4]).await.unwrap();
    assert_eq!(feats.len(), 2);
}

#[tokio::test]
async fn test_client_modes_agree() {
    let services = services(3);
    let dist = GraphClient::with_transport(transport(&services), &shard_config(3, 0))
        .await
        .unwrap();
    let local = GraphClient::from_graph(Arc::new(build_graph(None)), &shard_config(1, 0)).unwrap();
    assert!(dist.is_distributed());
    assert_eq!(dist.ns_size(), local.ns_size());

    let nodes: Vec<NodeId> = vec![3, item(6), 10, 0];
    assert_eq!(
        dist.lookup_context(&nodes).await.unwrap(),
        local.lookup_context(&nodes).await.unwrap()
    );
    assert_eq!(
        dist.lookup_feature(&nodes).await.unwrap(),
        local.lookup_feature(&nodes).await.unwrap()
    );

    let mut counts: HashMap<usize, usize> = HashMap::new();
    for client in [&dist, &local] {
        let paths = client
            .static_traverse(&nodes, &[5, 5, 5, 5], &WalkerInfo::default())
            .await
            .unwrap();
        for path in paths {
            *counts.entry(path.len()).or_default() += 1;
        }
    }
    assert_eq!(counts.get(&5), Some(&8));
}
