//! Content tree nodes.

use crate::entry::Entry;
use folio_codec::{from_canonical_cbor, to_canonical_cbor, CodecError, CodecResult, Decode, Encode};
use folio_storage::ObjectId;
use serde::{Deserialize, Serialize};

/// An immutable node of a content tree.
///
/// A node at level `L` holds, in key order, every key of its range whose
/// level is exactly `L`. Between and around those entries sit the subtrees
/// for the keys of lower level:
///
/// ```text
/// children[0] entries[0] children[1] entries[1] ... entries[n-1] children[n]
/// ```
///
/// `None` marks an empty range. A child is rooted at the highest level
/// present in its range, which is always below `L`; empty intermediate
/// levels are skipped rather than represented. Together this makes the shape
/// a pure function of the key set, so equal contents always produce equal
/// node ids.
///
/// The only node without entries is the root of the empty tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    level: u8,
    entries: Vec<Entry>,
    children: Vec<Option<ObjectId>>,
}

impl TreeNode {
    /// Creates a node, checking its structural invariants.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidStructure`] if the child count is not
    /// one more than the entry count, keys are not strictly increasing, a
    /// leaf has children, or an entry-less node is not the empty root.
    pub fn new(
        level: u8,
        entries: Vec<Entry>,
        children: Vec<Option<ObjectId>>,
    ) -> CodecResult<Self> {
        let node = Self {
            level,
            entries,
            children,
        };
        node.validate()?;
        Ok(node)
    }

    /// Returns the root node of the empty tree.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            level: 0,
            entries: Vec::new(),
            children: vec![None],
        }
    }

    /// Returns the level of this node (0 for leaves).
    #[must_use]
    pub fn level(&self) -> u8 {
        self.level
    }

    /// Returns the entries, sorted by key.
    #[must_use]
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Returns the child ids, one more than there are entries.
    #[must_use]
    pub fn children(&self) -> &[Option<ObjectId>] {
        &self.children
    }

    /// Returns true for the root of the empty tree.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consumes the node into its parts.
    #[must_use]
    pub fn into_parts(self) -> (u8, Vec<Entry>, Vec<Option<ObjectId>>) {
        (self.level, self.entries, self.children)
    }

    fn validate(&self) -> CodecResult<()> {
        if self.children.len() != self.entries.len() + 1 {
            return Err(CodecError::invalid_structure(format!(
                "{} entries with {} children",
                self.entries.len(),
                self.children.len()
            )));
        }
        if self
            .entries
            .windows(2)
            .any(|pair| pair[0].key >= pair[1].key)
        {
            return Err(CodecError::invalid_structure("keys not strictly increasing"));
        }
        if self.level == 0 && self.children.iter().any(Option::is_some) {
            return Err(CodecError::invalid_structure("leaf node with children"));
        }
        if self.entries.is_empty() && self.level != 0 {
            return Err(CodecError::invalid_structure("entry-less interior node"));
        }
        Ok(())
    }
}

impl Encode for TreeNode {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        to_canonical_cbor(self)
    }
}

impl Decode for TreeNode {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let node: Self = from_canonical_cbor(bytes)?;
        node.validate()?;
        Ok(node)
    }
}
