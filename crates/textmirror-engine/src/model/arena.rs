use std::sync::Arc;

use super::node::{Node, NodeKey};

const CHUNK_BITS: usize = 6;
const CHUNK_SIZE: usize = 1 << CHUNK_BITS;

type Chunk = Vec<Option<Arc<Node>>>;

/// Copy-on-write node storage addressed by [`NodeKey`].
///
/// Nodes live in fixed-size chunks behind `Arc`s. Cloning the arena copies
/// only chunk pointers, and writing a node copies just the chunk that holds
/// it, so consecutive snapshots share every untouched node.
#[derive(Debug, Clone, Default)]
pub(crate) struct NodeArena {
    chunks: Vec<Arc<Chunk>>,
    live: usize,
}

fn split(key: NodeKey) -> (usize, usize) {
    let index = key.index();
    (index >> CHUNK_BITS, index & (CHUNK_SIZE - 1))
}

impl NodeArena {
    pub fn get(&self, key: NodeKey) -> Option<&Node> {
        self.get_shared(key).map(|node| node.as_ref())
    }

    pub fn get_shared(&self, key: NodeKey) -> Option<&Arc<Node>> {
        let (chunk, slot) = split(key);
        self.chunks.get(chunk)?.get(slot)?.as_ref()
    }

    pub fn get_mut(&mut self, key: NodeKey) -> Option<&mut Node> {
        let (chunk, slot) = split(key);
        let chunk = Arc::make_mut(self.chunks.get_mut(chunk)?);
        chunk.get_mut(slot)?.as_mut().map(Arc::make_mut)
    }

    pub fn insert(&mut self, node: Node) {
        let (chunk, slot) = split(node.key);
        while self.chunks.len() <= chunk {
            self.chunks.push(Arc::new(vec![None; CHUNK_SIZE]));
        }
        let chunk = Arc::make_mut(&mut self.chunks[chunk]);
        if chunk[slot].replace(Arc::new(node)).is_none() {
            self.live += 1;
        }
    }

    pub fn remove(&mut self, key: NodeKey) -> Option<Arc<Node>> {
        let (chunk, slot) = split(key);
        let chunk = Arc::make_mut(self.chunks.get_mut(chunk)?);
        let removed = chunk.get_mut(slot)?.take();
        if removed.is_some() {
            self.live -= 1;
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.live
    }
}
