//! The session: one editable graph, its live runtime, history and commits.

use crate::clock::{Clock, SystemClock};
use crate::commit::{CommitJob, CommitOptions, RenderCache, RenderResult, Served};
use crate::config::EngineConfig;
use crate::error::{SessionError, SpatialBindError};
use crate::events::{ErrorSource, EventBus, EventKind, SessionEvent, SubscriptionId};
use crate::history::{ChangeKind, ChangeRecord, History, Mutation};
use crate::spatial::{
    AudioContextInfo, BindOptions, BindingInfo, CullOutcome, ListenerHandle, PositionHandle,
    SpatialDisposer, SpatialManager, SpatialMode, SpatialStats, Vec3,
};
use echoform_cache::{BufferCache, CacheStats};
use echoform_graph::{AssetMap, BuildReport, GraphContext, GraphError, RuntimeGraph, StereoBuffer};
use echoform_spec::{
    Asset, AutomationDef, Connection, ContentHash, GraphSpec, NodeDef, NodeType, ParamValue,
    SpecHasher, canonical_bytes, canonicalize, default_hasher, validate,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Options for [`Session::update_param`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateOptions {
    /// Apply at this graph time instead of immediately.
    pub at_time: Option<f64>,
    /// Push an undo record.
    pub record: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            at_time: None,
            record: true,
        }
    }
}

impl UpdateOptions {
    /// Scheduled at graph time `secs`.
    pub fn at(secs: f64) -> Self {
        Self {
            at_time: Some(secs),
            ..Self::default()
        }
    }

    /// Without an undo record.
    pub fn unrecorded() -> Self {
        Self {
            record: false,
            ..Self::default()
        }
    }
}

/// Snapshot of one node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInfo {
    /// Node id.
    pub id: String,
    /// Node type.
    pub node_type: NodeType,
    /// Referenced asset.
    pub asset_id: Option<String>,
    /// Every schema parameter with its live value.
    pub params: BTreeMap<String, ParamValue>,
    /// Whether the node feeds the master mix directly.
    pub is_sink: bool,
    /// False for players whose asset failed to load.
    pub asset_loaded: bool,
}

/// One processed block.
#[derive(Debug)]
pub struct BlockOutput<'a> {
    /// Master mix of the runtime graph.
    pub master: &'a StereoBuffer,
    /// Distance-attenuated mix of all spatial bindings at the graph rate.
    pub spatial: &'a StereoBuffer,
}

/// A parameter write scheduled on the live graph that has not happened yet.
#[derive(Debug, Clone)]
struct ScheduledWrite {
    node: String,
    param: String,
    /// Base value in effect before the write.
    held: ParamValue,
    value: ParamValue,
    at: f64,
}

/// Configures and creates a [`Session`].
pub struct SessionBuilder {
    cache: Arc<BufferCache>,
    config: EngineConfig,
    hasher: Arc<dyn SpecHasher>,
    clock: Arc<dyn Clock>,
}

impl SessionBuilder {
    /// Engine configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Spec and audio hasher.
    pub fn hasher(mut self, hasher: Arc<dyn SpecHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    /// Time source for spatial fades and culling.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Creates a session holding an empty spec.
    pub fn build(self) -> Result<Session, SessionError> {
        self.config.validate()?;
        let context = GraphContext {
            sample_rate: self.config.audio.sample_rate,
            block_size: self.config.audio.block_size,
        };
        let spec = GraphSpec::default();
        let graph = RuntimeGraph::build(&spec, context, &AssetMap::new())?;
        let audio_context = AudioContextInfo {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            sample_rate: context.sample_rate,
        };
        Ok(Session {
            history: History::new(self.config.history.limit),
            renders: RenderCache::new(self.config.render.cache_entries),
            spatial: SpatialManager::new(audio_context, self.clock),
            config: self.config,
            context,
            spec,
            graph,
            cache: self.cache,
            hasher: self.hasher,
            events: EventBus::new(),
            held: Vec::new(),
            assets: AssetMap::new(),
            spec_hash: OnceLock::new(),
            dirty: AtomicBool::new(false),
            preview: None,
            scheduled: Vec::new(),
            next_automation: 0,
            disposed: false,
        })
    }

    /// Creates a session and loads `spec` into it.
    pub async fn open(self, spec: GraphSpec) -> Result<Session, SessionError> {
        let mut session = self.build()?;
        session.load(spec).await?;
        Ok(session)
    }
}

/// An editable audio graph with a live runtime.
///
/// Every mutation validates the resulting spec and rebuilds the runtime
/// graph before it is accepted; a refused mutation leaves the session as it
/// was. Parameter writes are applied to the live node in place.
pub struct Session {
    config: EngineConfig,
    context: GraphContext,
    spec: GraphSpec,
    graph: RuntimeGraph,
    cache: Arc<BufferCache>,
    hasher: Arc<dyn SpecHasher>,
    events: EventBus,
    history: History,
    renders: RenderCache,
    spatial: SpatialManager,
    /// Cache locations referenced by the live graph, one per acquire.
    held: Vec<String>,
    /// Decoded buffers by asset id.
    assets: AssetMap,
    spec_hash: OnceLock<ContentHash>,
    dirty: AtomicBool,
    preview: Option<String>,
    scheduled: Vec<ScheduledWrite>,
    next_automation: u64,
    disposed: bool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("context", &self.context)
            .field("nodes", &self.spec.nodes.len())
            .field("disposed", &self.disposed)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Starts building a session around a shared buffer cache.
    pub fn builder(cache: Arc<BufferCache>) -> SessionBuilder {
        SessionBuilder {
            cache,
            config: EngineConfig::default(),
            hasher: default_hasher(),
            clock: Arc::new(SystemClock::new()),
        }
    }

    fn ensure_live(&self) -> Result<(), SessionError> {
        if self.disposed {
            Err(SessionError::Disposed)
        } else {
            Ok(())
        }
    }

    // --- loading -----------------------------------------------------------

    /// Replaces the session's spec, loading its assets through the cache.
    ///
    /// Assets that fail to load are reported as `error` events and leave
    /// their players silent. Clears undo history.
    pub async fn load(&mut self, spec: GraphSpec) -> Result<BuildReport, SessionError> {
        self.ensure_live()?;
        let spec = canonicalize(&spec);
        validate(&spec)?;

        let urls: Vec<String> = spec.assets.iter().map(|a| a.src.clone()).collect();
        let results = self.cache.acquire_many(&urls).await;
        let mut held = Vec::with_capacity(urls.len());
        let mut assets = AssetMap::new();
        for (asset, (url, result)) in spec.assets.iter().zip(results) {
            match result {
                Ok(buffer) => {
                    held.push(url);
                    assets.insert(asset.id.clone(), buffer);
                }
                Err(err) => self.report_asset_error(&err),
            }
        }

        let graph = match RuntimeGraph::build(&spec, self.context, &assets) {
            Ok(graph) => graph,
            Err(err) => {
                for url in &held {
                    self.cache.release(url);
                }
                return Err(err.into());
            }
        };

        let old = std::mem::replace(&mut self.held, held);
        for url in &old {
            self.cache.release(url);
        }
        self.assets = assets;
        self.spec = spec;
        self.graph = graph;
        self.history.clear();
        self.scheduled.clear();
        self.spatial.clear();
        if self.preview.take().is_some() {
            self.events
                .emit(&SessionEvent::PreviewChanged { node: None });
        }
        tracing::info!(
            nodes = self.spec.nodes.len(),
            assets = self.assets.len(),
            "session loaded"
        );
        self.mark_dirty();
        Ok(self.graph.report().clone())
    }

    /// Adds an asset and loads it. Returns whether it loaded; a failed load
    /// keeps the asset declared and is reported as an `error` event.
    ///
    /// No node can reference the asset yet, so the graph is rebuilt before
    /// the load and a refused asset never takes a cache lease.
    pub async fn add_asset(&mut self, asset: Asset) -> Result<bool, SessionError> {
        self.ensure_live()?;
        let mut candidate = self.spec.clone();
        candidate.assets.push(asset.clone());
        self.rebuild(candidate)?;

        match self.cache.acquire(&asset.src).await {
            Ok(buffer) => {
                self.held.push(asset.src.clone());
                self.assets.insert(asset.id, buffer);
                Ok(true)
            }
            Err(err) => {
                self.report_asset_error(&err);
                Ok(false)
            }
        }
    }

    fn report_asset_error(&self, err: &echoform_cache::AssetLoadError) {
        tracing::warn!(url = err.url(), error = %err, "asset failed to load");
        self.events.emit(&SessionEvent::Error {
            source: ErrorSource::Asset,
            subject: Some(err.url().to_string()),
            message: err.to_string(),
        });
    }

    // --- inspection --------------------------------------------------------

    /// Event subscriptions.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Shorthand for `events().subscribe`.
    pub fn subscribe(
        &self,
        kind: EventKind,
        handler: impl Fn(&SessionEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.events.subscribe(kind, handler)
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The graph's audio context, for listeners that share it.
    pub fn audio_context(&self) -> AudioContextInfo {
        self.spatial.context()
    }

    /// Current spec.
    pub fn spec(&self) -> &GraphSpec {
        &self.spec
    }

    /// Live runtime graph.
    pub fn runtime(&self) -> &RuntimeGraph {
        &self.graph
    }

    /// Canonical JSON of the current spec.
    pub fn serialize(&self) -> String {
        String::from_utf8_lossy(&canonical_bytes(&self.spec)).into_owned()
    }

    /// Content hash of the current spec, memoized until the next mutation.
    pub fn hash(&self) -> ContentHash {
        self.spec_hash
            .get_or_init(|| self.hasher.hash_spec(&self.spec))
            .clone()
    }

    /// Whether the spec changed since the last full commit.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Every node, in spec order.
    pub fn list_nodes(&self) -> Vec<NodeInfo> {
        self.graph
            .nodes()
            .iter()
            .filter_map(|n| self.node_info(&n.def.id))
            .collect()
    }

    /// One node.
    pub fn get_node(&self, id: &str) -> Option<NodeInfo> {
        self.node_info(id)
    }

    fn node_info(&self, id: &str) -> Option<NodeInfo> {
        let node = self.graph.node(id)?;
        let node_type = node.handle.node_type();
        let params = node_type
            .params()
            .iter()
            .filter_map(|p| Some((p.name.to_string(), node.handle.value(p.name)?)))
            .collect();
        Some(NodeInfo {
            id: id.to_string(),
            node_type,
            asset_id: node.def.asset_id.clone(),
            params,
            is_sink: node.export_bus.connected,
            asset_loaded: node.asset_loaded,
        })
    }

    /// Undo records available.
    pub fn undo_depth(&self) -> usize {
        self.history.undo_len()
    }

    /// Redo records available.
    pub fn redo_depth(&self) -> usize {
        self.history.redo_len()
    }

    // --- mutation ----------------------------------------------------------

    fn mark_dirty(&mut self) {
        self.spec_hash = OnceLock::new();
        self.dirty.store(true, Ordering::Release);
        self.events.emit(&SessionEvent::GraphDirty);
    }

    /// Validates `candidate`, rebuilds the runtime on it and swaps it in.
    fn rebuild(&mut self, candidate: GraphSpec) -> Result<(), SessionError> {
        let candidate = canonicalize(&candidate);
        let mut graph =
            RuntimeGraph::build(&candidate, self.context, &self.assets).map_err(|err| match err {
                GraphError::Spec(spec) => SessionError::Spec(spec),
                other => SessionError::Graph(other),
            })?;
        graph.set_position_frames(self.graph.position_frames());
        let now = graph.current_time();
        self.scheduled
            .retain(|write| write.at > now && replay_scheduled(&mut graph, write));
        if let Some(node) = self.preview.clone()
            && graph.set_solo(Some(&node)).is_err()
        {
            self.preview = None;
            self.events
                .emit(&SessionEvent::PreviewChanged { node: None });
        }
        self.spec = candidate;
        self.graph = graph;
        self.mark_dirty();
        Ok(())
    }

    fn record(&mut self, record: bool, kind: ChangeKind, forward: Mutation, inverse: Mutation) {
        if record {
            self.history.record(ChangeRecord {
                kind,
                forward,
                inverse,
            });
        }
    }

    /// Writes one parameter.
    ///
    /// Numbers are clamped into range, enum values must be listed options,
    /// booleans are coerced. The applied value is stored in the spec and
    /// returned.
    ///
    /// An immediate write moves the parameter's base value; automation
    /// curves on it keep running. With `at_time` the change is scheduled on
    /// the live node and replayed onto every rebuilt graph until it happens.
    /// A later immediate write to the same parameter cancels it.
    pub fn update_param(
        &mut self,
        node: &str,
        param: &str,
        value: impl Into<ParamValue>,
        options: UpdateOptions,
    ) -> Result<ParamValue, SessionError> {
        self.ensure_live()?;
        let value = value.into();
        let runtime = self
            .graph
            .node_mut(node)
            .ok_or_else(|| SessionError::NodeNotFound(node.to_string()))?;
        let held = runtime.handle.value(param);
        let coerced = match options.at_time {
            Some(at) => runtime.handle.schedule_param(param, &value, at),
            None => runtime.handle.set_param(param, &value),
        }
        .map_err(|source| SessionError::Param {
            node: node.to_string(),
            source,
        })?;
        if coerced.clamped {
            tracing::warn!(
                node,
                param,
                requested = %value,
                applied = %coerced.value,
                "parameter clamped"
            );
        }
        match (options.at_time, held) {
            (Some(at), Some(held)) => self.scheduled.push(ScheduledWrite {
                node: node.to_string(),
                param: param.to_string(),
                held,
                value: coerced.value.clone(),
                at,
            }),
            _ => self.cancel_scheduled(node, param),
        }

        let old = self
            .spec
            .node_mut(node)
            .and_then(|def| def.params.insert(param.to_string(), coerced.value.clone()));
        self.record(
            options.record,
            ChangeKind::Param,
            Mutation::SetParam {
                node: node.to_string(),
                param: param.to_string(),
                value: Some(coerced.value.clone()),
            },
            Mutation::SetParam {
                node: node.to_string(),
                param: param.to_string(),
                value: old,
            },
        );
        self.events.emit(&SessionEvent::ParamChange {
            node: node.to_string(),
            param: param.to_string(),
            value: coerced.value.clone(),
            clamped: coerced.clamped,
            at_time: options.at_time,
        });
        self.mark_dirty();
        Ok(coerced.value)
    }

    /// Replays a recorded parameter state. The live node gets the coerced
    /// value (the schema default for `None`); the spec gets `value` exactly as
    /// recorded, so an out-of-range value loaded from a file survives undo.
    fn restore_param(
        &mut self,
        node: &str,
        param: &str,
        value: Option<ParamValue>,
    ) -> Result<(), SessionError> {
        let param_error = |source: echoform_spec::ParamError| SessionError::Param {
            node: node.to_string(),
            source,
        };
        let runtime = self
            .graph
            .node_mut(node)
            .ok_or_else(|| SessionError::NodeNotFound(node.to_string()))?;
        let target = match &value {
            Some(value) => value.clone(),
            None => runtime
                .handle
                .node_type()
                .param(param)
                .map_err(param_error)?
                .default_value(),
        };
        let coerced = runtime
            .handle
            .set_param(param, &target)
            .map_err(param_error)?;
        self.cancel_scheduled(node, param);
        if let Some(def) = self.spec.node_mut(node) {
            match value {
                Some(value) => def.params.insert(param.to_string(), value),
                None => def.params.remove(param),
            };
        }
        self.events.emit(&SessionEvent::ParamChange {
            node: node.to_string(),
            param: param.to_string(),
            value: coerced.value,
            clamped: coerced.clamped,
            at_time: None,
        });
        self.mark_dirty();
        Ok(())
    }

    /// Drops pending scheduled writes to `node.param` from the live graph.
    fn cancel_scheduled(&mut self, node: &str, param: &str) {
        let graph = &mut self.graph;
        self.scheduled.retain(|write| {
            if write.node != node || write.param != param {
                return true;
            }
            if let Some(runtime) = graph.node_mut(node) {
                runtime
                    .handle
                    .cancel_scheduled(param, &write.value, write.at);
            }
            false
        });
    }

    fn next_automation_id(&mut self) -> String {
        loop {
            self.next_automation += 1;
            let id = format!("auto-{}", self.next_automation);
            if self.spec.automation(&id).is_none() {
                return id;
            }
        }
    }

    /// Adds an automation curve on `node.param`. Assigns an id when `def`
    /// has none and returns it.
    pub fn automate(
        &mut self,
        node: &str,
        param: &str,
        mut def: AutomationDef,
    ) -> Result<String, SessionError> {
        self.ensure_live()?;
        if self.spec.node(node).is_none() {
            return Err(SessionError::NodeNotFound(node.to_string()));
        }
        def.node_id = node.to_string();
        def.param = param.to_string();
        if def.id.is_empty() {
            def.id = self.next_automation_id();
        }
        self.add_automation(def, true)
    }

    fn add_automation(&mut self, def: AutomationDef, record: bool) -> Result<String, SessionError> {
        let mut candidate = self.spec.clone();
        candidate.automations.push(def.clone());
        self.rebuild(candidate)?;
        let id = def.id.clone();
        self.record(
            record,
            ChangeKind::Automation,
            Mutation::AddAutomation(def),
            Mutation::RemoveAutomation(id.clone()),
        );
        Ok(id)
    }

    /// Removes an automation by id and returns it.
    pub fn remove_automation(&mut self, id: &str) -> Result<AutomationDef, SessionError> {
        self.ensure_live()?;
        self.remove_automation_inner(id, true)
    }

    fn remove_automation_inner(
        &mut self,
        id: &str,
        record: bool,
    ) -> Result<AutomationDef, SessionError> {
        let def = self
            .spec
            .automation(id)
            .cloned()
            .ok_or_else(|| SessionError::AutomationNotFound(id.to_string()))?;
        let mut candidate = self.spec.clone();
        candidate.automations.retain(|a| a.id != id);
        self.rebuild(candidate)?;
        self.record(
            record,
            ChangeKind::Automation,
            Mutation::RemoveAutomation(id.to_string()),
            Mutation::AddAutomation(def.clone()),
        );
        Ok(def)
    }

    /// Adds a node. Players reference assets already declared with
    /// [`add_asset`](Self::add_asset).
    pub fn add_node(&mut self, def: NodeDef) -> Result<(), SessionError> {
        self.ensure_live()?;
        self.insert_node(def, Vec::new(), Vec::new(), Vec::new(), true)
    }

    fn insert_node(
        &mut self,
        def: NodeDef,
        connections: Vec<Connection>,
        automations: Vec<AutomationDef>,
        sends: Vec<echoform_spec::SendDef>,
        record: bool,
    ) -> Result<(), SessionError> {
        if self.spec.node(&def.id).is_some() {
            return Err(SessionError::DuplicateNode(def.id));
        }
        let mut candidate = self.spec.clone();
        candidate.nodes.push(def.clone());
        candidate.connections.extend(connections.iter().cloned());
        candidate.automations.extend(automations.iter().cloned());
        candidate.sends.extend(sends.iter().cloned());
        self.rebuild(candidate)?;
        let id = def.id.clone();
        self.record(
            record,
            ChangeKind::Node,
            Mutation::InsertNode {
                node: def,
                connections,
                automations,
                sends,
            },
            Mutation::RemoveNode(id),
        );
        Ok(())
    }

    /// Removes a node with its connections, automations, sends and spatial
    /// binding. Returns the removed declaration.
    pub fn remove_node(&mut self, id: &str) -> Result<NodeDef, SessionError> {
        self.ensure_live()?;
        self.remove_node_inner(id, true)
    }

    fn remove_node_inner(&mut self, id: &str, record: bool) -> Result<NodeDef, SessionError> {
        let def = self
            .spec
            .node(id)
            .cloned()
            .ok_or_else(|| SessionError::NodeNotFound(id.to_string()))?;
        let touches = |c: &Connection| c.from == id || c.to == id;
        let connections: Vec<_> = self
            .spec
            .connections
            .iter()
            .filter(|c| touches(c))
            .cloned()
            .collect();
        let automations: Vec<_> = self
            .spec
            .automations
            .iter()
            .filter(|a| a.node_id == id)
            .cloned()
            .collect();
        let sends: Vec<_> = self.spec.sends.iter().filter(|s| s.from == id).cloned().collect();

        let mut candidate = self.spec.clone();
        candidate.nodes.retain(|n| n.id != id);
        candidate.connections.retain(|c| !touches(c));
        candidate.automations.retain(|a| a.node_id != id);
        candidate.sends.retain(|s| s.from != id);
        self.rebuild(candidate)?;
        if self.spatial.unbind(id) {
            tracing::debug!(node = id, "spatial binding dropped with its node");
        }

        self.record(
            record,
            ChangeKind::Node,
            Mutation::RemoveNode(id.to_string()),
            Mutation::InsertNode {
                node: def.clone(),
                connections,
                automations,
                sends,
            },
        );
        Ok(def)
    }

    /// Connects `from` to `to`. Refuses duplicates and cycles.
    pub fn connect(&mut self, from: &str, to: &str) -> Result<(), SessionError> {
        self.ensure_live()?;
        self.connect_inner(Connection::new(from, to), true)
    }

    fn connect_inner(&mut self, conn: Connection, record: bool) -> Result<(), SessionError> {
        for id in [&conn.from, &conn.to] {
            if self.spec.node(id).is_none() {
                return Err(SessionError::NodeNotFound(id.clone()));
            }
        }
        if self.spec.connections.contains(&conn) {
            return Err(SessionError::AlreadyConnected {
                from: conn.from,
                to: conn.to,
            });
        }
        let mut candidate = self.spec.clone();
        candidate.connections.push(conn.clone());
        self.rebuild(candidate)?;
        self.record(
            record,
            ChangeKind::Connection,
            Mutation::Connect(conn.clone()),
            Mutation::Disconnect(conn),
        );
        Ok(())
    }

    /// Removes the connection from `from` to `to`.
    pub fn disconnect(&mut self, from: &str, to: &str) -> Result<(), SessionError> {
        self.ensure_live()?;
        self.disconnect_inner(Connection::new(from, to), true)
    }

    fn disconnect_inner(&mut self, conn: Connection, record: bool) -> Result<(), SessionError> {
        if !self.spec.connections.contains(&conn) {
            return Err(SessionError::NotConnected {
                from: conn.from,
                to: conn.to,
            });
        }
        let mut candidate = self.spec.clone();
        candidate.connections.retain(|c| c != &conn);
        self.rebuild(candidate)?;
        self.record(
            record,
            ChangeKind::Connection,
            Mutation::Disconnect(conn.clone()),
            Mutation::Connect(conn),
        );
        Ok(())
    }

    // --- history -----------------------------------------------------------

    fn apply(&mut self, mutation: Mutation) -> Result<(), SessionError> {
        match mutation {
            Mutation::SetParam { node, param, value } => self.restore_param(&node, &param, value),
            Mutation::AddAutomation(def) => self.add_automation(def, false).map(drop),
            Mutation::RemoveAutomation(id) => self.remove_automation_inner(&id, false).map(drop),
            Mutation::InsertNode {
                node,
                connections,
                automations,
                sends,
            } => self.insert_node(node, connections, automations, sends, false),
            Mutation::RemoveNode(id) => self.remove_node_inner(&id, false).map(drop),
            Mutation::Connect(conn) => self.connect_inner(conn, false),
            Mutation::Disconnect(conn) => self.disconnect_inner(conn, false),
        }
    }

    /// Reverts the most recent change. Returns its kind.
    pub fn undo(&mut self) -> Result<ChangeKind, SessionError> {
        self.ensure_live()?;
        let record = self
            .history
            .pop_undo()
            .ok_or(SessionError::HistoryEmpty("undo"))?;
        if let Err(err) = self.apply(record.inverse.clone()) {
            self.history.push_undo(record);
            return Err(err);
        }
        let kind = record.kind;
        self.history.push_redo(record);
        Ok(kind)
    }

    /// Re-applies the most recently undone change. Returns its kind.
    pub fn redo(&mut self) -> Result<ChangeKind, SessionError> {
        self.ensure_live()?;
        let record = self
            .history
            .pop_redo()
            .ok_or(SessionError::HistoryEmpty("redo"))?;
        if let Err(err) = self.apply(record.forward.clone()) {
            self.history.push_redo(record);
            return Err(err);
        }
        let kind = record.kind;
        self.history.push_undo(record);
        Ok(kind)
    }

    // --- live output -------------------------------------------------------

    /// Solos `node` on the master output, or restores the full mix.
    pub fn set_preview(&mut self, node: Option<&str>) -> Result<(), SessionError> {
        self.ensure_live()?;
        self.graph.set_solo(node)?;
        self.preview = node.map(str::to_string);
        self.events.emit(&SessionEvent::PreviewChanged {
            node: self.preview.clone(),
        });
        Ok(())
    }

    /// Currently previewed node.
    pub fn preview(&self) -> Option<&str> {
        self.preview.as_deref()
    }

    /// Processes one live block: the master mix and the spatial mix.
    pub fn process_block(&mut self, frames: usize) -> BlockOutput<'_> {
        self.graph.process_block(frames);
        let spatial = self.spatial.process(&self.graph, frames);
        BlockOutput {
            master: self.graph.master(),
            spatial,
        }
    }

    // --- commit ------------------------------------------------------------

    /// Renders the spec (or one node's upstream closure) offline, encodes it
    /// and caches the result by content.
    ///
    /// Emits `renderStart` when a fresh render begins, `renderDone` on
    /// success (cached or not) and `error` on failure.
    pub async fn commit(&self, options: CommitOptions) -> Result<Arc<RenderResult>, SessionError> {
        self.ensure_live()?;
        let spec = match &options.node_id {
            Some(id) => self.spec.restrict_to(id)?,
            None => self.spec.clone(),
        };
        let job = CommitJob {
            spec,
            options: &options,
            render: &self.config.render,
            context: self.context,
            cache: &self.cache,
            hasher: &self.hasher,
            renders: &self.renders,
        };
        let spec_hash = job.spec_hash();
        let events = &self.events;
        let start_hash = spec_hash.clone();
        let start_node = options.node_id.clone();
        let served = job
            .run(spec_hash.clone(), move || {
                events.emit(&SessionEvent::RenderStart {
                    spec_hash: start_hash,
                    node: start_node,
                });
            })
            .await;

        match served {
            Ok(served) => {
                let (result, cached) = match served {
                    Served::Cached(r) => (r, true),
                    Served::Rendered(r) => (r, false),
                };
                if options.node_id.is_none() && spec_hash == self.hash() {
                    self.dirty.store(false, Ordering::Release);
                }
                self.events.emit(&SessionEvent::RenderDone {
                    spec_hash,
                    audio_hash: result.audio_hash.clone(),
                    cached,
                });
                Ok(result)
            }
            Err(err) => {
                tracing::warn!(error = %err, "commit failed");
                self.events.emit(&SessionEvent::Error {
                    source: ErrorSource::Render,
                    subject: options.node_id.clone(),
                    message: err.to_string(),
                });
                Err(err.into())
            }
        }
    }

    /// Memoized render results.
    pub fn render_cache(&self) -> &RenderCache {
        &self.renders
    }

    // --- spatial -----------------------------------------------------------

    /// Binds `node` to an emitter at `position`. `None` options take the
    /// engine defaults.
    pub fn bind_spatial(
        &self,
        node: &str,
        position: PositionHandle,
        listener: ListenerHandle,
        options: Option<BindOptions>,
    ) -> Result<SpatialDisposer, SessionError> {
        self.ensure_live()?;
        if self.spec.node(node).is_none() {
            return Err(SpatialBindError::NodeNotFound(node.to_string()).into());
        }
        let options = options.unwrap_or_else(|| BindOptions::from_config(&self.config.spatial));
        Ok(self.spatial.bind(node, position, listener, options)?)
    }

    /// Snapshot of one binding.
    pub fn spatial_binding(&self, node: &str) -> Option<BindingInfo> {
        self.spatial.binding(node)
    }

    /// Mode of one binding.
    pub fn spatial_mode(&self, node: &str) -> Option<SpatialMode> {
        self.spatial.mode(node)
    }

    /// Spatial subsystem.
    pub fn spatial(&self) -> &SpatialManager {
        &self.spatial
    }

    /// Switches a binding to looping playback of a committed render.
    pub fn freeze_spatial_binding(
        &self,
        node: &str,
        result: &RenderResult,
    ) -> Result<(), SessionError> {
        self.ensure_live()?;
        self.spatial.freeze(node, Arc::clone(&result.buffer))?;
        self.events.emit(&SessionEvent::SpatialModeChanged {
            node: node.to_string(),
            mode: SpatialMode::Committed,
        });
        Ok(())
    }

    /// Returns a binding to live playback.
    pub fn unfreeze_spatial_binding(&self, node: &str) -> Result<(), SessionError> {
        self.ensure_live()?;
        self.spatial.unfreeze(node)?;
        self.events.emit(&SessionEvent::SpatialModeChanged {
            node: node.to_string(),
            mode: SpatialMode::Live,
        });
        Ok(())
    }

    /// Per-frame culling update. Failures are reported as `error` events and
    /// leave the binding ready for the next frame.
    pub fn update_spatial_culling(&self, camera: Vec3) -> Vec<CullOutcome> {
        let outcomes = self.spatial.update_culling(camera);
        for outcome in &outcomes {
            if let Err(err) = &outcome.result {
                self.events.emit(&SessionEvent::Error {
                    source: ErrorSource::Spatial,
                    subject: Some(outcome.node.clone()),
                    message: err.to_string(),
                });
            }
        }
        outcomes
    }

    /// Aggregate binding counters.
    pub fn spatial_stats(&self) -> SpatialStats {
        self.spatial.stats()
    }

    // --- cache control -----------------------------------------------------

    /// Drops every resident decoded buffer and memoized render.
    pub fn clear_cache(&self) -> usize {
        self.renders.clear();
        self.cache.clear()
    }

    /// Drops unreferenced decoded buffers idle for `max_age_secs`.
    pub fn dispose_unused_buffers(&self, max_age_secs: f64) -> usize {
        self.cache
            .dispose_unused(Duration::from_secs_f64(max_age_secs.max(0.0)))
    }

    /// Decoded-buffer cache counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    // --- teardown ----------------------------------------------------------

    /// Detaches spatial bindings, releases cached buffers and refuses further
    /// calls. Idempotent.
    pub fn dispose(&mut self) {
        if std::mem::replace(&mut self.disposed, true) {
            return;
        }
        self.spatial.clear();
        for url in self.held.drain(..) {
            self.cache.release(&url);
        }
        self.assets.clear();
        self.history.clear();
        tracing::debug!("session disposed");
    }

    /// Whether [`dispose`](Self::dispose) was called.
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

/// Re-applies a pending scheduled write on a freshly built graph: the base
/// value goes back to what it was before the write, and the step is
/// scheduled again. Returns false when the node or parameter is gone.
fn replay_scheduled(graph: &mut RuntimeGraph, write: &ScheduledWrite) -> bool {
    let Some(runtime) = graph.node_mut(&write.node) else {
        return false;
    };
    let handle = &mut runtime.handle;
    handle.set_param(&write.param, &write.held).is_ok()
        && handle
            .schedule_param(&write.param, &write.value, write.at)
            .is_ok()
}

impl Drop for Session {
    fn drop(&mut self) {
        self.dispose();
    }
}
