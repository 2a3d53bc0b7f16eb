//! The tree-level engine: descent, leaf insertion, and the bottom-up
//! propagation of splits and high-key updates back to the root.

use std::path::Path;

use crate::error::{Error, Result};
use crate::node::{Internal, Leaf, Node, PagedNode, INTERNAL_NODE_SIZE, LEAF_NODE_SIZE};
use crate::pager::Pager;

/// One step of the descent path: the node found there, and the slot in its
/// parent that led to it. The root's breadcrumb uses `index_in_parent = 0`,
/// `key_in_parent = 0`, `is_rightmost = true` as placeholders, since it has
/// no real parent slot.
struct Breadcrumb {
    page_id: u32,
    node: Node,
    index_in_parent: u32,
    key_in_parent: u32,
    is_rightmost: bool,
}

/// The node just mutated at the current ascent level: where it lives, and
/// its slot in its own parent (used to apply the next propagation step).
struct Current {
    page_id: u32,
    index_in_parent: u32,
    key_in_parent: u32,
    is_rightmost: bool,
}

/// A single-writer, single-file B+ tree engine keyed by `u32` with opaque
/// byte values. See the module docs for the on-disk layout; this type only
/// orchestrates descent, insertion, and ascent over it.
pub struct Engine {
    pager: Pager,
}

impl Engine {
    /// Opens the database file at `path`, creating it if it doesn't exist.
    /// Does not create a root node; call `initialize` for that.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Engine {
            pager: Pager::open(path)?,
        })
    }

    /// Idempotently ensures a root node exists, creating an empty leaf root
    /// if the database is freshly created.
    pub fn initialize(&mut self) -> Result<()> {
        if self.pager.root_initialized() {
            return Ok(());
        }
        let leaf = Leaf::new_empty(LEAF_NODE_SIZE);
        self.pager.write_new_root(&Node::Leaf(leaf))?;
        Ok(())
    }

    pub fn close(self) -> Result<()> {
        self.pager.close()
    }

    fn descend(&mut self, key: u32) -> Result<Vec<Breadcrumb>> {
        if !self.pager.root_initialized() {
            return Err(Error::Invariant("insert called before initialize".into()));
        }

        let mut breadcrumbs = Vec::new();
        let mut current_id = self.pager.root_page_id();
        let mut index_in_parent = 0u32;
        let mut key_in_parent = 0u32;
        let mut is_rightmost = true;

        loop {
            let paged = self.pager.read_paged_node(current_id)?;
            let is_leaf = matches!(paged.node, Node::Leaf(_));

            if is_leaf {
                breadcrumbs.push(Breadcrumb {
                    page_id: paged.page_id,
                    node: paged.node,
                    index_in_parent,
                    key_in_parent,
                    is_rightmost,
                });
                return Ok(breadcrumbs);
            }

            let internal = match &paged.node {
                Node::Internal(i) => i,
                Node::Leaf(_) => unreachable!(),
            };
            let (idx, reference) = internal.find_position_for_descent(key)?;
            let next_id = reference.page_id;
            let next_index_in_parent = idx;
            let next_key_in_parent = reference.key;
            let next_is_rightmost = idx == internal.elements_count() - 1;

            breadcrumbs.push(Breadcrumb {
                page_id: paged.page_id,
                node: paged.node,
                index_in_parent,
                key_in_parent,
                is_rightmost,
            });

            current_id = next_id;
            index_in_parent = next_index_in_parent;
            key_in_parent = next_key_in_parent;
            is_rightmost = next_is_rightmost;
        }
    }

    /// Inserts `key`/`value`. Fails with `DuplicateKey` if `key` is already
    /// present anywhere in the tree.
    pub fn insert(&mut self, key: u32, value: &[u8]) -> Result<()> {
        let mut breadcrumbs = self.descend(key)?;
        let leaf_bc = breadcrumbs
            .pop()
            .ok_or_else(|| Error::Invariant("descent produced no breadcrumbs".into()))?;

        let mut leaf = match leaf_bc.node {
            Node::Leaf(l) => l,
            Node::Internal(_) => {
                return Err(Error::Invariant("descent ended on an internal node".into()))
            }
        };

        let outcome = leaf.insert(key, value)?;
        self.pager.write_paged_node(&PagedNode {
            page_id: leaf_bc.page_id,
            node: Node::Leaf(leaf),
        })?;

        let mut pending_split: Option<(u32, Node)> = outcome
            .split
            .map(|s| (s.split_key, Node::Leaf(s.new_leaf)));
        let mut pending_high_key: Option<u32> = if pending_split.is_none() {
            outcome.high_key.map(|h| h.new_high_key)
        } else {
            None
        };

        let mut current = Current {
            page_id: leaf_bc.page_id,
            index_in_parent: leaf_bc.index_in_parent,
            key_in_parent: leaf_bc.key_in_parent,
            is_rightmost: leaf_bc.is_rightmost,
        };

        loop {
            if pending_split.is_none() && pending_high_key.is_none() {
                return Ok(());
            }

            let parent_bc = match breadcrumbs.pop() {
                Some(bc) => bc,
                None => break,
            };
            let mut parent_internal = match parent_bc.node {
                Node::Internal(i) => i,
                Node::Leaf(_) => {
                    return Err(Error::Invariant("ancestor in descent path was a leaf".into()))
                }
            };

            if let Some((split_key, new_node)) = pending_split.take() {
                let new_page_id = self.pager.allocate_and_write(&new_node.encode()?)?;
                let max_key_of_new = new_node.max_key()?;

                let ins_outcome = if !current.is_rightmost {
                    parent_internal.update_at(current.index_in_parent, current.key_in_parent, new_page_id)?;
                    parent_internal.insert(split_key, current.page_id)?
                } else {
                    parent_internal.update_at(current.index_in_parent, split_key, current.page_id)?;
                    parent_internal.insert(max_key_of_new, new_page_id)?
                };

                self.pager.write_paged_node(&PagedNode {
                    page_id: parent_bc.page_id,
                    node: Node::Internal(parent_internal),
                })?;

                if let Some(split) = ins_outcome.split {
                    pending_split = Some((split.split_key, Node::Internal(split.new_internal)));
                } else if let Some(hk) = ins_outcome.high_key {
                    pending_high_key = Some(hk.new_high_key);
                }
            } else if let Some(new_high_key) = pending_high_key.take() {
                if !current.is_rightmost {
                    return Ok(());
                }
                let hk_outcome = parent_internal.update_at(current.index_in_parent, new_high_key, current.page_id)?;
                self.pager.write_paged_node(&PagedNode {
                    page_id: parent_bc.page_id,
                    node: Node::Internal(parent_internal),
                })?;
                pending_high_key = hk_outcome.map(|h| h.new_high_key);
            }

            current = Current {
                page_id: parent_bc.page_id,
                index_in_parent: parent_bc.index_in_parent,
                key_in_parent: parent_bc.key_in_parent,
                is_rightmost: parent_bc.is_rightmost,
            };
        }

        if let Some((split_key, new_node)) = pending_split {
            let new_page_id = self.pager.allocate_and_write(&new_node.encode()?)?;
            let max_key_of_new = new_node.max_key()?;

            let mut new_root = Internal::new_empty(INTERNAL_NODE_SIZE);
            new_root.insert(split_key, current.page_id)?;
            new_root.insert(max_key_of_new, new_page_id)?;
            self.pager.write_new_root(&Node::Internal(new_root))?;
        }

        Ok(())
    }
}
