//! # Scenes
//!
//! A [`Scene`] is an actor that owns a relationship graph over its members. The graph is
//! a multigraph: two actors may be joined by several edges, each with its own weight.
//! The scene itself is a node, joined to every member it was constructed with.
//!
//! ## Scoped activation
//!
//! Which scene is "current" is tracked by a [`SceneContext`], one per logical flow of
//! control. [`SceneContext::enter`] pushes a scene and returns a [`SceneGuard`]; dropping
//! the guard restores exactly the scene that was current before, on every exit path.
//!
//! ```rust
//! use actor_scene::{Actor, ActorRef, BareActor, Scene, SceneContext};
//!
//! let alice: ActorRef = BareActor::new();
//! let office = Scene::new([alice.clone()]);
//! let meeting = Scene::new([alice.clone()]);
//!
//! let ctx = SceneContext::new();
//! {
//!     let _office = ctx.enter(&office);
//!     {
//!         let _meeting = ctx.enter(&meeting);
//!         assert_eq!(alice.scene(&ctx).unwrap().id(), meeting.id());
//!     }
//!     assert_eq!(alice.scene(&ctx).unwrap().id(), office.id());
//! }
//! assert!(alice.scene(&ctx).is_err());
//! ```

use parking_lot::RwLock;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use serde_json::Value;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::actor::{Actor, ActorCore, ActorDirectory, ActorRef};
use crate::config::Limits;
use crate::entity::{EntityId, Kind, Metadata};
use crate::error::{Error, Result};
use crate::handler::HandlerTable;

enum Node {
    Scene,
    Member(ActorRef),
}

struct SceneState {
    members: Vec<ActorRef>,
    directory: HashMap<EntityId, ActorRef>,
    graph: UnGraph<Node, f64>,
    nodes: HashMap<EntityId, NodeIndex>,
    scene: NodeIndex,
}

/// One edge from an actor's point of view.
#[derive(Debug, Clone)]
pub struct Relationship {
    pub actor: ActorRef,
    /// Edge index, increasing with insertion order.
    pub edge: usize,
    pub weight: f64,
}

/// Key accepted by [`Scene::get`] and [`Scene::contains`].
#[derive(Clone, Copy)]
pub enum MemberKey<'a> {
    Id(&'a str),
    Actor(&'a dyn Actor),
}

impl<'a> From<&'a str> for MemberKey<'a> {
    fn from(id: &'a str) -> Self {
        MemberKey::Id(id)
    }
}

impl<'a> From<&'a String> for MemberKey<'a> {
    fn from(id: &'a String) -> Self {
        MemberKey::Id(id)
    }
}

impl<'a> From<&'a EntityId> for MemberKey<'a> {
    fn from(id: &'a EntityId) -> Self {
        MemberKey::Id(id.as_str())
    }
}

impl<'a> From<&'a ActorRef> for MemberKey<'a> {
    fn from(actor: &'a ActorRef) -> Self {
        MemberKey::Actor(actor.as_ref())
    }
}

impl fmt::Debug for MemberKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberKey::Id(id) => write!(f, "Id({})", id),
            MemberKey::Actor(actor) => write!(f, "Actor({})", actor.id()),
        }
    }
}

crate::kind!(Scene);

pub struct Scene {
    core: ActorCore,
    limits: Limits,
    state: RwLock<SceneState>,
}

impl Scene {
    /// A plain scene with no handlers of its own.
    pub fn new(actors: impl IntoIterator<Item = ActorRef>) -> Arc<Self> {
        Self::builder().members(actors).build()
    }

    /// A scene that handles messages with `handlers`.
    pub fn with_handlers(handlers: Arc<HandlerTable>, actors: impl IntoIterator<Item = ActorRef>) -> Arc<Self> {
        Self::builder().handlers(handlers).members(actors).build()
    }

    pub fn builder() -> SceneBuilder {
        SceneBuilder::default()
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Adds `actor` as a member joined to the scene node. Returns false if already present.
    pub fn add_member(&self, actor: ActorRef) -> bool {
        let mut state = self.state.write();
        if state.directory.contains_key(actor.id()) {
            return false;
        }
        let node = state.graph.add_node(Node::Member(actor.clone()));
        let scene = state.scene;
        state.graph.add_edge(scene, node, self.limits.default_weight);
        state.nodes.insert(actor.id().clone(), node);
        state.directory.insert(actor.id().clone(), actor.clone());
        state.members.push(actor);
        true
    }

    /// Adds an edge of default weight between two members (or a member and the scene).
    pub fn connect(&self, a: &EntityId, b: &EntityId) -> Result<usize> {
        self.connect_weighted(a, b, self.limits.default_weight)
    }

    /// Adds an edge; parallel edges are kept, each with its own weight.
    pub fn connect_weighted(&self, a: &EntityId, b: &EntityId, weight: f64) -> Result<usize> {
        let mut state = self.state.write();
        let a = *state
            .nodes
            .get(a)
            .ok_or_else(|| Error::UnknownMember(a.to_string()))?;
        let b = *state
            .nodes
            .get(b)
            .ok_or_else(|| Error::UnknownMember(b.to_string()))?;
        Ok(state.graph.add_edge(a, b, weight).index())
    }

    /// Joins every pair of members; returns the number of edges added.
    pub fn connect_all(&self) -> usize {
        let mut state = self.state.write();
        let nodes: Vec<NodeIndex> = state
            .members
            .iter()
            .filter_map(|member| state.nodes.get(member.id()).copied())
            .collect();
        let mut added = 0;
        for (i, a) in nodes.iter().enumerate() {
            for b in &nodes[i + 1..] {
                state.graph.add_edge(*a, *b, self.limits.default_weight);
                added += 1;
            }
        }
        added
    }

    pub fn edge_count(&self) -> usize {
        self.state.read().graph.edge_count()
    }

    /// Members in insertion order.
    pub fn members(&self) -> Vec<ActorRef> {
        self.state.read().members.clone()
    }

    pub fn directory(&self) -> HashMap<EntityId, ActorRef> {
        self.state.read().directory.clone()
    }

    /// Looks up a member by id. Actor keys are rejected.
    pub fn get<'a>(&self, key: impl Into<MemberKey<'a>>) -> Result<ActorRef> {
        match key.into() {
            MemberKey::Id(id) => self
                .state
                .read()
                .directory
                .get(&EntityId::from(id))
                .cloned()
                .ok_or_else(|| Error::UnknownMember(id.to_string())),
            key @ MemberKey::Actor(_) => Err(Error::UnsupportedKey(format!(
                "{:?}; scene lookup accepts member ids only",
                key
            ))),
        }
    }

    /// Membership by id, or by actor identity.
    pub fn contains<'a>(&self, key: impl Into<MemberKey<'a>>) -> bool {
        let state = self.state.read();
        match key.into() {
            MemberKey::Id(id) => state.directory.contains_key(&EntityId::from(id)),
            MemberKey::Actor(actor) => state.members.iter().any(|member| member.id() == actor.id()),
        }
    }

    /// Edges touching `id`, sorted by weight then insertion order.
    ///
    /// The scene node shows up as the scene itself. Unknown ids have no relationships.
    pub fn relationships_of(self: &Arc<Self>, id: &EntityId) -> Vec<Relationship> {
        let state = self.state.read();
        let Some(&node) = state.nodes.get(id) else {
            return Vec::new();
        };
        let mut relationships: Vec<Relationship> = state
            .graph
            .edges(node)
            .map(|edge| {
                let other = if edge.source() == node { edge.target() } else { edge.source() };
                let actor: ActorRef = match &state.graph[other] {
                    Node::Scene => self.clone(),
                    Node::Member(actor) => actor.clone(),
                };
                Relationship {
                    actor,
                    edge: edge.id().index(),
                    weight: *edge.weight(),
                }
            })
            .collect();
        relationships.sort_by(|a, b| {
            a.weight
                .partial_cmp(&b.weight)
                .unwrap_or(Ordering::Equal)
                .then(a.edge.cmp(&b.edge))
        });
        relationships
    }

    /// Actors directly related to `id`, in relationship order.
    pub fn neighbors(self: &Arc<Self>, id: &EntityId) -> Vec<ActorRef> {
        self.relationships_of(id)
            .into_iter()
            .map(|relationship| relationship.actor)
            .collect()
    }
}

impl Actor for Scene {
    fn core(&self) -> &ActorCore {
        &self.core
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl ActorDirectory for Scene {
    fn resolve(&self, id: &EntityId) -> Option<ActorRef> {
        self.state.read().directory.get(id).cloned()
    }
}

impl fmt::Debug for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Scene")
            .field("id", self.id())
            .field("kind", &self.kind())
            .field("members", &state.members.len())
            .field("edges", &state.graph.edge_count())
            .finish()
    }
}

pub struct SceneBuilder {
    kind: &'static str,
    handlers: Option<Arc<HandlerTable>>,
    limits: Limits,
    metadata: Metadata,
    members: Vec<ActorRef>,
}

impl Default for SceneBuilder {
    fn default() -> Self {
        Self {
            kind: Scene::KIND,
            handlers: None,
            limits: Limits::current(),
            metadata: Metadata::new(),
            members: Vec::new(),
        }
    }
}

impl SceneBuilder {
    /// Names the scene after `K`, so its id reads e.g. `soccer_game_...`.
    pub fn kind<K: Kind>(mut self) -> Self {
        self.kind = K::KIND;
        self
    }

    pub fn handlers(mut self, handlers: Arc<HandlerTable>) -> Self {
        self.handlers = Some(handlers);
        self
    }

    pub fn limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn members(mut self, actors: impl IntoIterator<Item = ActorRef>) -> Self {
        self.members.extend(actors);
        self
    }

    pub fn build(self) -> Arc<Scene> {
        let handlers = self.handlers.unwrap_or_else(HandlerTable::empty);
        let mut core = ActorCore::named(self.kind, handlers);
        for (key, value) in self.metadata {
            core = core.with_metadata(key, value);
        }

        let mut graph = UnGraph::default();
        let scene_node = graph.add_node(Node::Scene);
        let mut nodes = HashMap::new();
        nodes.insert(core.id().clone(), scene_node);

        let scene = Arc::new(Scene {
            core,
            limits: self.limits,
            state: RwLock::new(SceneState {
                members: Vec::new(),
                directory: HashMap::new(),
                graph,
                nodes,
                scene: scene_node,
            }),
        });
        for actor in self.members {
            scene.add_member(actor);
        }
        debug!(scene = %scene.id(), members = scene.members().len(), "Scene built");
        scene
    }
}

/// The stack of active scenes for one logical flow of control.
///
/// Not `Sync`: each thread or task owns its own context, so activations never leak
/// between flows.
///
/// Guards are expected to drop in reverse order of entry. Dropping an outer guard first
/// also deactivates everything entered after it; the inner guards then become no-ops
/// instead of removing scenes entered later.
#[derive(Default)]
pub struct SceneContext {
    stack: RefCell<Vec<(u64, Arc<Scene>)>>,
    entries: Cell<u64>,
}

impl SceneContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `scene` current until the returned guard is dropped.
    pub fn enter(&self, scene: &Arc<Scene>) -> SceneGuard<'_> {
        let entry = self.entries.get();
        self.entries.set(entry + 1);
        let mut stack = self.stack.borrow_mut();
        let depth = stack.len();
        stack.push((entry, scene.clone()));
        info!(scene = %scene.id(), depth = depth + 1, "Enter scene");
        SceneGuard {
            context: self,
            depth,
            entry,
            scene: scene.id().clone(),
        }
    }

    pub fn current(&self) -> Option<Arc<Scene>> {
        self.stack.borrow().last().map(|(_, scene)| scene.clone())
    }

    pub fn depth(&self) -> usize {
        self.stack.borrow().len()
    }

    /// Runs `f` with `scene` active.
    pub fn with<R>(&self, scene: &Arc<Scene>, f: impl FnOnce() -> R) -> R {
        let _guard = self.enter(scene);
        f()
    }
}

impl fmt::Debug for SceneContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stack = self.stack.borrow();
        f.debug_struct("SceneContext")
            .field("scenes", &stack.iter().map(|(_, scene)| scene.id()).collect::<Vec<_>>())
            .finish()
    }
}

/// Restores the previously current scene when dropped.
#[must_use = "the scene is deactivated as soon as the guard is dropped"]
pub struct SceneGuard<'a> {
    context: &'a SceneContext,
    depth: usize,
    entry: u64,
    scene: EntityId,
}

impl SceneGuard<'_> {
    pub fn scene_id(&self) -> &EntityId {
        &self.scene
    }
}

impl Drop for SceneGuard<'_> {
    fn drop(&mut self) {
        let mut stack = self.context.stack.borrow_mut();
        if stack.get(self.depth).map(|(entry, _)| *entry) != Some(self.entry) {
            warn!(scene = %self.scene, depth = self.depth, "Scene already exited by an outer guard");
            return;
        }
        if stack.len() > self.depth + 1 {
            warn!(scene = %self.scene, inner = stack.len() - self.depth - 1, "Exit scene with inner scenes still active");
        }
        stack.truncate(self.depth);
        debug!(scene = %self.scene, depth = self.depth, "Exit scene");
    }
}

impl fmt::Debug for SceneGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneGuard")
            .field("scene", &self.scene)
            .field("depth", &self.depth)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::BareActor;

    fn actors(n: usize) -> Vec<ActorRef> {
        (0..n).map(|_| BareActor::new() as ActorRef).collect()
    }

    #[test]
    fn test_constructor_members_join_scene_node() {
        let members = actors(3);
        let scene = Scene::new(members.clone());
        assert_eq!(scene.edge_count(), 3);
        for member in &members {
            let related = scene.neighbors(member.id());
            assert_eq!(related.len(), 1);
            assert_eq!(related[0].id(), scene.id());
        }
        assert_eq!(scene.neighbors(scene.id()).len(), 3);
    }

    #[test]
    fn test_parallel_edges_are_kept() {
        let members = actors(2);
        let scene = Scene::new(members.clone());
        scene.connect_weighted(members[0].id(), members[1].id(), 3.0).unwrap();
        scene.connect_weighted(members[0].id(), members[1].id(), 0.5).unwrap();

        let weights: Vec<f64> = scene
            .relationships_of(members[0].id())
            .iter()
            .map(|relationship| relationship.weight)
            .collect();
        assert_eq!(weights, vec![0.5, 1.0, 3.0]);
    }

    #[test]
    fn test_connect_unknown_member_fails() {
        let members = actors(1);
        let scene = Scene::new(members.clone());
        let stranger = BareActor::new();
        let err = scene.connect(members[0].id(), stranger.id()).unwrap_err();
        assert!(matches!(err, Error::UnknownMember(id) if id == stranger.id().as_str()));
    }

    #[test]
    fn test_get_and_contains() {
        let members = actors(2);
        let scene = Scene::new(members.clone());
        let stranger: ActorRef = BareActor::new();

        assert_eq!(scene.get(members[1].id()).unwrap().id(), members[1].id());
        assert!(matches!(scene.get("missing_1"), Err(Error::UnknownMember(_))));
        assert!(matches!(scene.get(&members[0]), Err(Error::UnsupportedKey(_))));

        assert!(scene.contains(members[0].id()));
        assert!(scene.contains(&members[0]));
        assert!(!scene.contains(&stranger));
        assert!(!scene.contains(stranger.id().as_str()));
    }

    #[test]
    fn test_guard_restores_previous_scene() {
        let outer = Scene::new(actors(1));
        let inner = Scene::new(actors(1));
        let ctx = SceneContext::new();

        let first = ctx.enter(&outer);
        let second = ctx.enter(&inner);
        assert_eq!(ctx.depth(), 2);
        assert_eq!(ctx.current().unwrap().id(), inner.id());
        drop(second);
        assert_eq!(ctx.current().unwrap().id(), outer.id());
        drop(first);
        assert!(ctx.current().is_none());

        let depth = ctx.with(&inner, || ctx.depth());
        assert_eq!(depth, 1);
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn test_guard_restores_on_unwind() {
        let scene = Scene::new(actors(1));
        let ctx = SceneContext::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = ctx.enter(&scene);
            panic!("handler blew up");
        }));
        assert!(result.is_err());
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn test_out_of_order_guard_leaves_later_entries_alone() {
        let (first, second, third) = (Scene::new(actors(1)), Scene::new(actors(1)), Scene::new(actors(1)));
        let ctx = SceneContext::new();

        let outer = ctx.enter(&first);
        let inner = ctx.enter(&second);
        drop(outer);
        assert_eq!(ctx.depth(), 0);

        let later = ctx.enter(&third);
        drop(inner);
        assert_eq!(ctx.depth(), 1);
        assert_eq!(ctx.current().unwrap().id(), third.id());

        let again = ctx.enter(&second);
        drop(later);
        assert_eq!(ctx.depth(), 0);
        drop(again);
        assert_eq!(ctx.depth(), 0);
    }
}
