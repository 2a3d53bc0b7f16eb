//! Node layout and the leaf/internal insert algorithms.
//!
//! Every node is a fixed-size buffer with a 100-byte header followed by a
//! slot array of fixed 100-byte records. Leaf slots (`KeyDataReference`)
//! point at variable-length payload bytes that grow down from the top of
//! the buffer; internal slots (`KeyPageReference`) just carry a child page
//! id. Both kinds share the same split algorithm: a virtual merged list of
//! the existing, sorted slots plus the one new item being inserted, cut at
//! its midpoint.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

use crate::error::{Error, Result};
use crate::writer::FixedSizeWriter;

/// Size of the header written at the front of every node.
pub const NODE_HEADER_SIZE: u32 = 100;
/// Size of every slot record, leaf or internal, key-carrying or not.
pub const SLOT_SIZE: u32 = 100;
/// Default page size for production nodes. `node_size` in the node header
/// is always equal to the page size, per the on-disk format: a node's
/// body buffer is `node_size - NODE_HEADER_SIZE` bytes, but the field
/// itself carries the full page size so every reader of the format can
/// rely on `node_size == page_size` without special-casing either kind.
pub const PAGE_SIZE: u32 = 4096;
pub const LEAF_NODE_SIZE: u32 = PAGE_SIZE;
pub const INTERNAL_NODE_SIZE: u32 = PAGE_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Internal = 0,
    Leaf = 1,
}

impl NodeType {
    fn from_u32(value: u32) -> Result<Self> {
        match value {
            0 => Ok(NodeType::Internal),
            1 => Ok(NodeType::Leaf),
            other => Err(Error::Format(format!("unknown node type byte {}", other))),
        }
    }
}

/// A divider update propagated up to an ancestor whose rightmost child just
/// gained a new maximum key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HighKeyUpdate {
    pub new_high_key: u32,
}

/// A leaf slot: the key, and where its payload lives in this node's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyDataReference {
    pub key: u32,
    pub offset: u32,
    pub length: u32,
}

impl KeyDataReference {
    fn encode(&self, out: &mut [u8; SLOT_SIZE as usize]) -> Result<()> {
        let mut writer = FixedSizeWriter::new(out);
        writer.write_u32::<LittleEndian>(self.key)?;
        writer.write_u32::<LittleEndian>(self.offset)?;
        writer.write_u32::<LittleEndian>(self.length)?;
        Ok(())
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        let mut cursor = std::io::Cursor::new(buf);
        let key = cursor.read_u32::<LittleEndian>()?;
        let offset = cursor.read_u32::<LittleEndian>()?;
        let length = cursor.read_u32::<LittleEndian>()?;
        Ok(KeyDataReference { key, offset, length })
    }
}

/// An internal slot: the divider key, and the child page it routes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPageReference {
    pub key: u32,
    pub page_id: u32,
}

impl KeyPageReference {
    fn encode(&self, out: &mut [u8; SLOT_SIZE as usize]) -> Result<()> {
        let mut writer = FixedSizeWriter::new(out);
        writer.write_u32::<LittleEndian>(self.key)?;
        writer.write_u32::<LittleEndian>(self.page_id)?;
        Ok(())
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        let mut cursor = std::io::Cursor::new(buf);
        let key = cursor.read_u32::<LittleEndian>()?;
        let page_id = cursor.read_u32::<LittleEndian>()?;
        Ok(KeyPageReference { key, page_id })
    }
}

pub struct LeafSplit {
    pub split_key: u32,
    pub new_leaf: Leaf,
}

pub struct LeafInsertOutcome {
    pub reference: KeyDataReference,
    pub split: Option<LeafSplit>,
    pub high_key: Option<HighKeyUpdate>,
}

pub struct InternalSplit {
    pub split_key: u32,
    pub new_internal: Internal,
}

pub struct InternalInsertOutcome {
    pub reference: KeyPageReference,
    pub split: Option<InternalSplit>,
    pub high_key: Option<HighKeyUpdate>,
}

/// One merged-list entry used while computing a split: either a slot that
/// already lives in the node, or the new item being inserted.
enum MergedItem<T> {
    Committed(T),
    New,
}

fn split_point_for(merged_count: u32) -> u32 {
    (merged_count + 1) / 2
}

/// A leaf node: sorted `KeyDataReference` slots, payloads packed from the
/// high end of the buffer downward.
#[derive(Debug, Clone)]
pub struct Leaf {
    node_size: u32,
    free_space_start: u32,
    free_space_end: u32,
    elements_count: u32,
    buf: Vec<u8>,
}

impl Leaf {
    /// `node_size` is the declared on-disk node size (equal to the page
    /// size); the body buffer itself is `node_size - NODE_HEADER_SIZE`.
    pub fn new_empty(node_size: u32) -> Self {
        let body_len = node_size - NODE_HEADER_SIZE;
        Leaf {
            node_size,
            free_space_start: 0,
            free_space_end: body_len,
            elements_count: 0,
            buf: vec![0u8; body_len as usize],
        }
    }

    pub fn node_size(&self) -> u32 {
        self.node_size
    }

    pub fn elements_count(&self) -> u32 {
        self.elements_count
    }

    pub fn available_space(&self) -> u32 {
        self.free_space_end - self.free_space_start
    }

    pub fn slot_at(&self, index: u32) -> Result<KeyDataReference> {
        if index >= self.elements_count {
            return Err(Error::Invariant(format!(
                "leaf slot index {} out of range ({} elements)",
                index, self.elements_count
            )));
        }
        let start = (index * SLOT_SIZE) as usize;
        KeyDataReference::decode(&self.buf[start..start + SLOT_SIZE as usize])
    }

    pub fn payload(&self, reference: &KeyDataReference) -> &[u8] {
        let start = reference.offset as usize;
        let end = start + reference.length as usize;
        &self.buf[start..end]
    }

    pub fn max_key(&self) -> Result<u32> {
        if self.elements_count == 0 {
            return Err(Error::Invariant("max_key called on empty leaf".into()));
        }
        Ok(self.slot_at(self.elements_count - 1)?.key)
    }

    /// Binary search lower bound: returns `(exists, index)` where `index`
    /// is where `key` sits or would be inserted among the active slots.
    fn find_position(&self, key: u32) -> Result<(bool, u32)> {
        let mut lo = 0u32;
        let mut hi = self.elements_count;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.slot_at(mid)?.key < key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        let exists = lo < self.elements_count && self.slot_at(lo)?.key == key;
        Ok((exists, lo))
    }

    /// Appends a slot/payload pair at the current tail with no shifting and
    /// no duplicate check. Used only to rebuild a node from an
    /// already-sorted sequence while splitting.
    fn append_committed(&mut self, key: u32, data: &[u8]) -> Result<KeyDataReference> {
        let required = SLOT_SIZE + data.len() as u32;
        if self.available_space() < required {
            return Err(Error::Invariant(
                "split target ran out of space while appending moved items".into(),
            ));
        }
        let offset = self.free_space_end - data.len() as u32;
        let reference = KeyDataReference {
            key,
            offset,
            length: data.len() as u32,
        };
        let index = self.elements_count;
        self.write_slot(index, &reference)?;
        let start = offset as usize;
        self.buf[start..start + data.len()].copy_from_slice(data);
        self.elements_count += 1;
        self.free_space_start += SLOT_SIZE;
        self.free_space_end = offset;
        Ok(reference)
    }

    fn write_slot(&mut self, index: u32, reference: &KeyDataReference) -> Result<()> {
        let mut encoded = [0u8; SLOT_SIZE as usize];
        reference.encode(&mut encoded)?;
        let start = (index * SLOT_SIZE) as usize;
        self.buf[start..start + SLOT_SIZE as usize].copy_from_slice(&encoded);
        Ok(())
    }

    /// Inserts `key`/`data`, splitting into a new sibling if there isn't
    /// room. Returns `DuplicateKey` if `key` is already present, and
    /// `NoSpace` if even a split wouldn't make room.
    pub fn insert(&mut self, key: u32, data: &[u8]) -> Result<LeafInsertOutcome> {
        let required = SLOT_SIZE + data.len() as u32;
        if self.available_space() < required {
            if required < self.node_size / 2 {
                return self.split_and_insert(key, data);
            }
            return Err(Error::NoSpace);
        }

        let (exists, index) = self.find_position(key)?;
        if exists {
            return Err(Error::DuplicateKey(key));
        }

        let offset = self.free_space_end - data.len() as u32;
        let reference = KeyDataReference {
            key,
            offset,
            length: data.len() as u32,
        };

        if index < self.elements_count {
            let src_start = (index * SLOT_SIZE) as usize;
            let src_end = (self.elements_count * SLOT_SIZE) as usize;
            self.buf.copy_within(src_start..src_end, src_start + SLOT_SIZE as usize);
        }
        self.write_slot(index, &reference)?;
        let start = offset as usize;
        self.buf[start..start + data.len()].copy_from_slice(data);

        let was_tail = index == self.elements_count;
        self.elements_count += 1;
        self.free_space_start += SLOT_SIZE;
        self.free_space_end = offset;

        let high_key = if was_tail {
            Some(HighKeyUpdate { new_high_key: key })
        } else {
            None
        };

        Ok(LeafInsertOutcome {
            reference,
            split: None,
            high_key,
        })
    }

    fn split_and_insert(&mut self, key: u32, data: &[u8]) -> Result<LeafInsertOutcome> {
        let existing: Vec<KeyDataReference> = (0..self.elements_count)
            .map(|i| self.slot_at(i))
            .collect::<Result<_>>()?;

        let merged_index = existing.partition_point(|r| r.key < key) as u32;
        if (merged_index as usize) < existing.len() && existing[merged_index as usize].key == key {
            return Err(Error::DuplicateKey(key));
        }

        let merged_count = existing.len() as u32 + 1;
        let split_point = split_point_for(merged_count);

        let merged: Vec<MergedItem<KeyDataReference>> = (0..merged_count)
            .map(|i| {
                if i == merged_index {
                    MergedItem::New
                } else if i < merged_index {
                    MergedItem::Committed(existing[i as usize])
                } else {
                    MergedItem::Committed(existing[(i - 1) as usize])
                }
            })
            .collect();

        let split_key = match &merged[split_point as usize] {
            MergedItem::Committed(r) => r.key,
            MergedItem::New => key,
        };

        let mut new_leaf = Leaf::new_empty(self.node_size);
        let mut new_reference = None;
        let mut moved_committed_count = 0u32;
        for item in &merged[split_point as usize..] {
            match item {
                MergedItem::Committed(r) => {
                    let payload = self.payload(r).to_vec();
                    new_leaf.append_committed(r.key, &payload)?;
                    moved_committed_count += 1;
                }
                MergedItem::New => {
                    new_reference = Some(new_leaf.append_committed(key, data)?);
                }
            }
        }

        for _ in 0..moved_committed_count {
            self.elements_count -= 1;
            self.free_space_start -= SLOT_SIZE;
        }

        let reference = if merged_index < split_point {
            self.insert(key, data)?.reference
        } else {
            new_reference
                .ok_or_else(|| Error::Invariant("new item landed in the moved range".into()))?
        };

        let high_key = if merged_index == merged_count - 1 {
            Some(HighKeyUpdate { new_high_key: key })
        } else {
            None
        };

        Ok(LeafInsertOutcome {
            reference,
            split: Some(LeafSplit { split_key, new_leaf }),
            high_key,
        })
    }

    pub(crate) fn encode(&self) -> Result<Vec<u8>> {
        encode_node(
            NodeType::Leaf,
            self.node_size,
            self.free_space_start,
            self.free_space_end,
            self.elements_count,
            &self.buf,
        )
    }
}

/// An internal node: sorted `KeyPageReference` slots routing to children.
/// Unlike a leaf, its free space ceiling is constant — there's no payload
/// growing from the top, only the slot array growing from the bottom.
#[derive(Debug, Clone)]
pub struct Internal {
    node_size: u32,
    free_space_start: u32,
    free_space_end: u32,
    elements_count: u32,
    buf: Vec<u8>,
}

impl Internal {
    /// `node_size` is the declared on-disk node size (equal to the page
    /// size); the body buffer itself is `node_size - NODE_HEADER_SIZE`.
    pub fn new_empty(node_size: u32) -> Self {
        let body_len = node_size - NODE_HEADER_SIZE;
        Internal {
            node_size,
            free_space_start: 0,
            free_space_end: body_len,
            elements_count: 0,
            buf: vec![0u8; body_len as usize],
        }
    }

    pub fn node_size(&self) -> u32 {
        self.node_size
    }

    pub fn elements_count(&self) -> u32 {
        self.elements_count
    }

    pub fn available_space(&self) -> u32 {
        self.free_space_end - self.free_space_start
    }

    pub fn slot_at(&self, index: u32) -> Result<KeyPageReference> {
        if index >= self.elements_count {
            return Err(Error::Invariant(format!(
                "internal slot index {} out of range ({} elements)",
                index, self.elements_count
            )));
        }
        let start = (index * SLOT_SIZE) as usize;
        KeyPageReference::decode(&self.buf[start..start + SLOT_SIZE as usize])
    }

    pub fn max_key(&self) -> Result<u32> {
        if self.elements_count == 0 {
            return Err(Error::Invariant("max_key called on empty internal node".into()));
        }
        Ok(self.slot_at(self.elements_count - 1)?.key)
    }

    fn find_position(&self, key: u32) -> Result<(bool, u32)> {
        let mut lo = 0u32;
        let mut hi = self.elements_count;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.slot_at(mid)?.key < key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        let exists = lo < self.elements_count && self.slot_at(lo)?.key == key;
        Ok((exists, lo))
    }

    /// Finds the child to descend into for `key`: the lower-bound slot, or
    /// the last slot if `key` exceeds every divider (routes past the
    /// rightmost child rather than falling off the edge).
    pub fn find_position_for_descent(&self, key: u32) -> Result<(u32, KeyPageReference)> {
        let (_, mut index) = self.find_position(key)?;
        if index == self.elements_count {
            index = self.elements_count - 1;
        }
        Ok((index, self.slot_at(index)?))
    }

    fn write_slot(&mut self, index: u32, reference: &KeyPageReference) -> Result<()> {
        let mut encoded = [0u8; SLOT_SIZE as usize];
        reference.encode(&mut encoded)?;
        let start = (index * SLOT_SIZE) as usize;
        self.buf[start..start + SLOT_SIZE as usize].copy_from_slice(&encoded);
        Ok(())
    }

    fn append_committed(&mut self, key: u32, page_id: u32) -> Result<KeyPageReference> {
        if self.available_space() < SLOT_SIZE {
            return Err(Error::Invariant(
                "split target ran out of space while appending moved items".into(),
            ));
        }
        let reference = KeyPageReference { key, page_id };
        let index = self.elements_count;
        self.write_slot(index, &reference)?;
        self.elements_count += 1;
        self.free_space_start += SLOT_SIZE;
        Ok(reference)
    }

    /// Rewrites the slot at `index` in place. Returns a high-key update iff
    /// this was the rightmost slot, since its key now bounds the node.
    pub fn update_at(&mut self, index: u32, key: u32, page_id: u32) -> Result<Option<HighKeyUpdate>> {
        if index >= self.elements_count {
            return Err(Error::Invariant(format!(
                "update_at index {} out of range ({} elements)",
                index, self.elements_count
            )));
        }
        self.write_slot(index, &KeyPageReference { key, page_id })?;
        if index == self.elements_count - 1 {
            Ok(Some(HighKeyUpdate { new_high_key: key }))
        } else {
            Ok(None)
        }
    }

    pub fn insert(&mut self, key: u32, page_id: u32) -> Result<InternalInsertOutcome> {
        if self.available_space() < SLOT_SIZE {
            if SLOT_SIZE < self.node_size / 2 {
                return self.split_and_insert(key, page_id);
            }
            return Err(Error::NoSpace);
        }

        let (exists, index) = self.find_position(key)?;
        if exists {
            return Err(Error::DuplicateKey(key));
        }

        let reference = KeyPageReference { key, page_id };
        if index < self.elements_count {
            let src_start = (index * SLOT_SIZE) as usize;
            let src_end = (self.elements_count * SLOT_SIZE) as usize;
            self.buf.copy_within(src_start..src_end, src_start + SLOT_SIZE as usize);
        }
        self.write_slot(index, &reference)?;

        let was_tail = index == self.elements_count;
        self.elements_count += 1;
        self.free_space_start += SLOT_SIZE;

        let high_key = if was_tail {
            Some(HighKeyUpdate { new_high_key: key })
        } else {
            None
        };

        Ok(InternalInsertOutcome {
            reference,
            split: None,
            high_key,
        })
    }

    fn split_and_insert(&mut self, key: u32, page_id: u32) -> Result<InternalInsertOutcome> {
        let existing: Vec<KeyPageReference> = (0..self.elements_count)
            .map(|i| self.slot_at(i))
            .collect::<Result<_>>()?;

        let merged_index = existing.partition_point(|r| r.key < key) as u32;
        if (merged_index as usize) < existing.len() && existing[merged_index as usize].key == key {
            return Err(Error::DuplicateKey(key));
        }

        let merged_count = existing.len() as u32 + 1;
        let split_point = split_point_for(merged_count);

        let merged: Vec<MergedItem<KeyPageReference>> = (0..merged_count)
            .map(|i| {
                if i == merged_index {
                    MergedItem::New
                } else if i < merged_index {
                    MergedItem::Committed(existing[i as usize])
                } else {
                    MergedItem::Committed(existing[(i - 1) as usize])
                }
            })
            .collect();

        let split_key = match &merged[split_point as usize] {
            MergedItem::Committed(r) => r.key,
            MergedItem::New => key,
        };

        let mut new_internal = Internal::new_empty(self.node_size);
        let mut new_reference = None;
        let mut moved_committed_count = 0u32;
        for item in &merged[split_point as usize..] {
            match item {
                MergedItem::Committed(r) => {
                    new_internal.append_committed(r.key, r.page_id)?;
                    moved_committed_count += 1;
                }
                MergedItem::New => {
                    new_reference = Some(new_internal.append_committed(key, page_id)?);
                }
            }
        }

        for _ in 0..moved_committed_count {
            self.elements_count -= 1;
            self.free_space_start -= SLOT_SIZE;
        }

        let reference = if merged_index < split_point {
            self.insert(key, page_id)?.reference
        } else {
            new_reference
                .ok_or_else(|| Error::Invariant("new item landed in the moved range".into()))?
        };

        let high_key = if merged_index == merged_count - 1 {
            Some(HighKeyUpdate { new_high_key: key })
        } else {
            None
        };

        Ok(InternalInsertOutcome {
            reference,
            split: Some(InternalSplit { split_key, new_internal }),
            high_key,
        })
    }

    pub(crate) fn encode(&self) -> Result<Vec<u8>> {
        encode_node(
            NodeType::Internal,
            self.node_size,
            self.free_space_start,
            self.free_space_end,
            self.elements_count,
            &self.buf,
        )
    }
}

fn encode_node(
    node_type: NodeType,
    node_size: u32,
    free_space_start: u32,
    free_space_end: u32,
    elements_count: u32,
    body: &[u8],
) -> Result<Vec<u8>> {
    let mut out = vec![0u8; NODE_HEADER_SIZE as usize + body.len()];
    {
        let mut writer = FixedSizeWriter::new(&mut out[..NODE_HEADER_SIZE as usize]);
        writer.write_u32::<LittleEndian>(node_type as u32)?;
        writer.write_u32::<LittleEndian>(node_size)?;
        writer.write_u32::<LittleEndian>(free_space_start)?;
        writer.write_u32::<LittleEndian>(free_space_end)?;
        writer.write_u32::<LittleEndian>(elements_count)?;
    }
    out[NODE_HEADER_SIZE as usize..].copy_from_slice(body);
    Ok(out)
}

/// A node paired with the page id it's stored at.
pub struct PagedNode {
    pub page_id: u32,
    pub node: Node,
}

/// Either kind of node, as read off disk or built in memory during a split.
#[derive(Debug, Clone)]
pub enum Node {
    Leaf(Leaf),
    Internal(Internal),
}

impl Node {
    pub fn node_type(&self) -> NodeType {
        match self {
            Node::Leaf(_) => NodeType::Leaf,
            Node::Internal(_) => NodeType::Internal,
        }
    }

    pub fn elements_count(&self) -> u32 {
        match self {
            Node::Leaf(l) => l.elements_count(),
            Node::Internal(i) => i.elements_count(),
        }
    }

    pub fn max_key(&self) -> Result<u32> {
        match self {
            Node::Leaf(l) => l.max_key(),
            Node::Internal(i) => i.max_key(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        match self {
            Node::Leaf(l) => l.encode(),
            Node::Internal(i) => i.encode(),
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < NODE_HEADER_SIZE as usize {
            return Err(Error::Format("node buffer shorter than its header".into()));
        }
        let mut cursor = std::io::Cursor::new(&buf[..NODE_HEADER_SIZE as usize]);
        let node_type = NodeType::from_u32(cursor.read_u32::<LittleEndian>()?)?;
        let node_size = cursor.read_u32::<LittleEndian>()?;
        let free_space_start = cursor.read_u32::<LittleEndian>()?;
        let free_space_end = cursor.read_u32::<LittleEndian>()?;
        let elements_count = cursor.read_u32::<LittleEndian>()?;

        if buf.len() as u32 != node_size {
            return Err(Error::Format(format!(
                "node declares node_size {} but its buffer is {} bytes",
                node_size,
                buf.len()
            )));
        }
        let body_start = NODE_HEADER_SIZE as usize;
        let body = buf[body_start..].to_vec();

        match node_type {
            NodeType::Leaf => Ok(Node::Leaf(Leaf {
                node_size,
                free_space_start,
                free_space_end,
                elements_count,
                buf: body,
            })),
            NodeType::Internal => Ok(Node::Internal(Internal {
                node_size,
                free_space_start,
                free_space_end,
                elements_count,
                buf: body,
            })),
        }
    }
}
