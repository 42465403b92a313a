use std::ops::Bound;

use serde::{Deserialize, Serialize};

use crate::error::StoreResult;
use crate::iterator::KeyMap;
use crate::traits::{Batch, KeyValueWriter};

/// A single queued batch operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
    /// Removes `[start, end)`; an empty `end` is unbounded.
    DeleteRange { start: Vec<u8>, end: Vec<u8> },
}

impl BatchOp {
    /// Bytes this operation contributes to [`Batch::value_size`].
    pub fn size(&self) -> usize {
        match self {
            BatchOp::Put { key, value } => key.len() + value.len(),
            BatchOp::Delete { key } => key.len(),
            BatchOp::DeleteRange { start, end } => start.len() + end.len(),
        }
    }

    /// Apply this operation to an in-memory map.
    pub fn apply(&self, map: &mut KeyMap) {
        match self {
            BatchOp::Put { key, value } => {
                map.insert(key.clone(), value.clone());
            }
            BatchOp::Delete { key } => {
                map.remove(key);
            }
            BatchOp::DeleteRange { start, end } => delete_range(map, start, end),
        }
    }

    /// Re-issue this operation against a writer.
    pub fn replay(&self, writer: &dyn KeyValueWriter) -> StoreResult<()> {
        match self {
            BatchOp::Put { key, value } => writer.put(key, value),
            BatchOp::Delete { key } => writer.delete(key),
            BatchOp::DeleteRange { start, end } => writer.delete_range(start, end),
        }
    }
}

/// Remove every key of `map` in `[start, end)`.
pub fn delete_range(map: &mut KeyMap, start: &[u8], end: &[u8]) {
    let doomed: Vec<Vec<u8>> = if end.is_empty() {
        map.range::<[u8], _>((Bound::Included(start), Bound::Unbounded))
            .map(|(k, _)| k.clone())
            .collect()
    } else if start < end {
        map.range::<[u8], _>((Bound::Included(start), Bound::Excluded(end)))
            .map(|(k, _)| k.clone())
            .collect()
    } else {
        Vec::new()
    };
    for key in doomed {
        map.remove(&key);
    }
}

/// Apply a sequence of operations in order.
pub fn apply_ops(map: &mut KeyMap, ops: &[BatchOp]) {
    for op in ops {
        op.apply(map);
    }
}

/// Where an [`OpBatch`] sends its operations on `write`.
pub trait BatchTarget: Send {
    /// Atomically apply `ops` in order.
    fn commit(&self, ops: &[BatchOp]) -> StoreResult<()>;
}

/// Batch that records operations and hands them to a [`BatchTarget`] on
/// [`write`](Batch::write).
pub struct OpBatch<T: BatchTarget> {
    target: T,
    ops: Vec<BatchOp>,
    size: usize,
}

impl<T: BatchTarget> OpBatch<T> {
    pub fn new(target: T) -> Self {
        Self {
            target,
            ops: Vec::new(),
            size: 0,
        }
    }

    /// Operations queued so far.
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    fn push(&mut self, op: BatchOp) {
        self.size += op.size();
        self.ops.push(op);
    }
}

impl<T: BatchTarget> Batch for OpBatch<T> {
    fn put(&mut self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.push(BatchOp::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        });
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> StoreResult<()> {
        self.push(BatchOp::Delete { key: key.to_vec() });
        Ok(())
    }

    fn delete_range(&mut self, start: &[u8], end: &[u8]) -> StoreResult<()> {
        self.push(BatchOp::DeleteRange {
            start: start.to_vec(),
            end: end.to_vec(),
        });
        Ok(())
    }

    fn value_size(&self) -> usize {
        self.size
    }

    fn len(&self) -> usize {
        self.ops.len()
    }

    fn write(&mut self) -> StoreResult<()> {
        if self.ops.is_empty() {
            return Ok(());
        }
        self.target.commit(&self.ops)
    }

    fn reset(&mut self) {
        self.ops.clear();
        self.size = 0;
    }

    fn replay(&self, writer: &dyn KeyValueWriter) -> StoreResult<()> {
        for op in &self.ops {
            op.replay(writer)?;
        }
        Ok(())
    }
}

impl<T: BatchTarget> std::fmt::Debug for OpBatch<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpBatch")
            .field("ops", &self.ops.len())
            .field("value_size", &self.size)
            .finish()
    }
}
