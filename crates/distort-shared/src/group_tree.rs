//! Randomized root-to-leaf paths through the group tree.
//!
//! The tree is a perfect binary tree of depth [`MAX_PATH_DEPTH`] whose nodes
//! are numbered breadth-first: node `p` has children `2p + 1` and `2p + 2`.
//! Every subgroup index is a node of this tree, and each dequeue cycle
//! broadcasts along one whole path rather than to a single node.

use rand::RngCore;

use crate::constants::MAX_PATH_DEPTH;
use crate::error::GroupTreeError;
use crate::topics::membership;

pub use crate::constants::MAX_INDEX;

/// A root-to-leaf path, always starting at node 0.
pub type GroupPath = [u32; MAX_PATH_DEPTH + 1];

/// Draw a path using one bit per level of a random 32-bit word from the OS RNG.
pub fn random_path() -> GroupPath {
    path_from_bits(rand::rngs::OsRng.next_u32())
}

/// Build the path selected by the low `MAX_PATH_DEPTH` bits of `bits`.
///
/// Bit `i` picks the child at level `i + 1`: 0 goes left (`2p + 1`),
/// 1 goes right (`2p + 2`).
pub fn path_from_bits(mut bits: u32) -> GroupPath {
    let mut path = [0u32; MAX_PATH_DEPTH + 1];
    for i in 0..MAX_PATH_DEPTH {
        let parent = path[i];
        path[i + 1] = if bits & 1 == 0 {
            2 * parent + 1
        } else {
            2 * parent + 2
        };
        bits >>= 1;
    }
    path
}

/// Pick a random node at `level` (0 is the root, `MAX_PATH_DEPTH` the leaves).
pub fn random_from_level(level: usize) -> Result<u32, GroupTreeError> {
    if level > MAX_PATH_DEPTH {
        return Err(GroupTreeError::LevelOutOfRange {
            level,
            max: MAX_PATH_DEPTH,
        });
    }
    Ok(random_path()[level])
}

/// Depth of a node index within the tree, or `None` past the leaves.
pub fn level_of(index: u32) -> Option<usize> {
    if index > MAX_INDEX {
        return None;
    }
    // Level k holds indices [2^k - 1, 2^(k+1) - 2]
    Some((32 - (index + 1).leading_zeros() - 1) as usize)
}

/// True if any node on `path` is one of `groups`' memberships in `group_name`.
pub fn path_contains_membership(group_name: &str, path: &[u32], groups: &[String]) -> bool {
    path.iter().any(|index| {
        let wanted = membership(group_name, *index);
        groups.iter().any(|g| *g == wanted)
    })
}
