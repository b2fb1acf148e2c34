//! # Lineage & Propagation
//!
//! Every reply points at the message it answers, so any message carries its full causal
//! history. This module walks that history ([`ancestors`], [`chain`], [`closest`]),
//! assembles collections of messages into a forest ([`tree`]), and drives delivery
//! ([`send`], [`propagate`]).
//!
//! ## Propagation
//!
//! [`propagate`] sends a message to its receiver, yields each reply, and before moving
//! on to the next sibling sends that reply to *its* receiver, depth first. The expansion
//! is an explicit stack of frames rather than recursion, so conversations of any length
//! run in constant native stack. A reply is only delivered when the caller pulls past
//! it: consuming exactly `n` items runs exactly `n` handler invocations, the first of
//! which delivers the seed message. Cycles are not detected; stopping is the caller's business.
//!
//! ```rust,ignore
//! let passes: Vec<_> = lineage::propagate(&kickoff, &ctx).take(42).collect::<Result<_>>()?;
//! ```

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::HashMap;
use std::sync::Arc;

use crate::actor::{Dispatch, Target};
use crate::config::Limits;
use crate::error::{Error, Result};
use crate::message::{Message, MessageKind, MessageType};
use crate::scene::SceneContext;

/// Iterator over a message's parents, nearest first.
#[derive(Debug, Clone)]
pub struct Ancestors<'a> {
    next: Option<&'a Arc<Message>>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a Arc<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.parent();
        Some(current)
    }
}

/// Parents of `message`, nearest first, until the root.
pub fn ancestors(message: &Message) -> Ancestors<'_> {
    Ancestors {
        next: message.parent(),
    }
}

/// Up to `height` messages ending at `message`, oldest first.
#[derive(Debug)]
pub struct Chain {
    messages: std::vec::IntoIter<Arc<Message>>,
}

impl Iterator for Chain {
    type Item = Arc<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        self.messages.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.messages.size_hint()
    }
}

impl ExactSizeIterator for Chain {}

/// The last `height` links of the reply chain ending at `message`, oldest first.
///
/// A height of zero yields nothing. Parents are only reachable from their replies, so the
/// links are collected up front (at most `height` of them) and then handed out once.
pub fn chain(message: &Arc<Message>, height: usize) -> Chain {
    let mut messages: Vec<Arc<Message>> = Vec::with_capacity(height.min(64));
    if height > 0 {
        messages.push(message.clone());
        messages.extend(ancestors(message).take(height - 1).cloned());
    }
    messages.reverse();
    Chain {
        messages: messages.into_iter(),
    }
}

pub fn chain_list(message: &Arc<Message>, height: usize) -> Vec<Arc<Message>> {
    chain(message, height).collect()
}

/// Nearest ancestor whose concrete type is one of `kinds`, looking at most `max_height`
/// parents up.
pub fn closest(message: &Message, kinds: &[MessageKind], max_height: usize) -> Result<Arc<Message>> {
    let mut searched = 0;
    let mut walk = ancestors(message);
    while searched < max_height {
        let Some(ancestor) = walk.next() else {
            return Err(not_found(kinds, searched, false));
        };
        searched += 1;
        if kinds.contains(&ancestor.kind()) {
            return Ok(ancestor.clone());
        }
    }
    let exhausted = walk.next().is_some();
    Err(not_found(kinds, searched, exhausted))
}

/// [`closest`] for a single type, bounded by [`Limits::current`] (256 steps by default).
pub fn closest_of<M: MessageType>(message: &Message) -> Result<Arc<Message>> {
    closest(message, &[MessageKind::of::<M>()], Limits::current().max_search_height)
}

fn not_found(kinds: &[MessageKind], searched: usize, exhausted: bool) -> Error {
    Error::AncestorNotFound {
        kinds: kinds.iter().map(|kind| kind.name()).collect(),
        searched,
        exhausted,
    }
}

/// Parent/child forest over a collection of messages.
///
/// Only links where both ends are in the collection become edges; a message whose
/// parent is absent is a root.
#[derive(Debug, Default)]
pub struct LineageGraph {
    graph: DiGraph<Arc<Message>, ()>,
    index: HashMap<crate::entity::EntityId, NodeIndex>,
}

impl LineageGraph {
    pub fn graph(&self) -> &DiGraph<Arc<Message>, ()> {
        &self.graph
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, message: &Message) -> bool {
        self.index.contains_key(message.id())
    }

    /// Messages without an in-collection parent, in input order.
    pub fn roots(&self) -> Vec<Arc<Message>> {
        self.graph
            .node_indices()
            .filter(|node| {
                self.graph
                    .neighbors_directed(*node, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(|node| self.graph[node].clone())
            .collect()
    }

    /// Direct replies to `message` within the collection, in input order.
    pub fn children(&self, message: &Message) -> Vec<Arc<Message>> {
        let Some(&node) = self.index.get(message.id()) else {
            return Vec::new();
        };
        let mut children: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(node, Direction::Outgoing)
            .collect();
        children.sort();
        children
            .into_iter()
            .map(|child| self.graph[child].clone())
            .collect()
    }
}

/// Builds the lineage forest of `messages`. Duplicates are collapsed.
pub fn tree<'a>(messages: impl IntoIterator<Item = &'a Arc<Message>>) -> LineageGraph {
    let mut lineage = LineageGraph::default();
    for message in messages {
        if !lineage.index.contains_key(message.id()) {
            let node = lineage.graph.add_node(message.clone());
            lineage.index.insert(message.id().clone(), node);
        }
    }
    let links: Vec<(NodeIndex, NodeIndex)> = lineage
        .graph
        .node_indices()
        .filter_map(|child| {
            let parent = lineage.graph[child].parent_id()?;
            lineage.index.get(parent).map(|parent| (*parent, child))
        })
        .collect();
    for (parent, child) in links {
        lineage.graph.add_edge(parent, child, ());
    }
    lineage
}

/// Delivers `message` to its receiver. Fails on first pull if it has none.
pub fn send<'a>(message: &Arc<Message>, scope: &'a SceneContext) -> Dispatch<'a> {
    match message.receiver() {
        Some(receiver) => Dispatch::pending(Target::Shared(receiver.clone()), message.clone(), scope),
        None => Dispatch::missing(message.id().clone()),
    }
}

enum Frame<I> {
    Pending(Arc<Message>),
    Running(I),
}

/// Depth-first, on-demand expansion of a message into everything it causes.
pub struct Propagation<F, I> {
    step: F,
    stack: Vec<Frame<I>>,
}

impl<F, I> Iterator for Propagation<F, I>
where
    F: FnMut(&Arc<Message>) -> I,
    I: Iterator<Item = Result<Arc<Message>>>,
{
    type Item = Result<Arc<Message>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.stack.pop()? {
                Frame::Pending(message) => {
                    let replies = (self.step)(&message);
                    self.stack.push(Frame::Running(replies));
                }
                Frame::Running(mut replies) => match replies.next() {
                    Some(Ok(reply)) => {
                        self.stack.push(Frame::Running(replies));
                        self.stack.push(Frame::Pending(reply.clone()));
                        return Some(Ok(reply));
                    }
                    Some(Err(e)) => return Some(Err(e)),
                    None => {}
                },
            }
        }
    }
}

/// Sends `message` and recursively every reply, yielding replies depth first.
///
/// The initial message itself is not yielded. A failed delivery is yielded as an error
/// and ends only that branch.
pub fn propagate<'a>(
    message: &Arc<Message>,
    scope: &'a SceneContext,
) -> Propagation<impl FnMut(&Arc<Message>) -> Dispatch<'a>, Dispatch<'a>> {
    propagate_with(message, move |message: &Arc<Message>| send(message, scope))
}

/// [`propagate`] with a custom delivery step.
pub fn propagate_with<F, I>(message: &Arc<Message>, step: F) -> Propagation<F, I>
where
    F: FnMut(&Arc<Message>) -> I,
    I: Iterator<Item = Result<Arc<Message>>>,
{
    Propagation {
        step,
        stack: vec![Frame::Pending(message.clone())],
    }
}
