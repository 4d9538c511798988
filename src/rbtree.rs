use std::ops::Index;

use slab::Slab;

/// An order-statistics red-black tree over an arena of nodes.
///
/// Nodes live in a [`Slab`] and are addressed by `usize` keys; removed
/// slots are reused by later insertions, so repeated build/tear-down
/// cycles do not reallocate. Every node additionally carries prev/next
/// links kept in sync with the in-order traversal, giving O(1)
/// neighbor queries.
///
/// There is no comparator: the position of a new node is given
/// explicitly by the caller via [`insert_successor`]. This suits
/// sweep-line structures where the order of elements is decided by
/// geometric predicates evaluated at insertion time, not by a total
/// order on the payload.
///
/// [`insert_successor`]: RedBlackTree::insert_successor
#[derive(Debug)]
pub struct RedBlackTree<T> {
    nodes: Slab<Node<T>>,
    root: Option<usize>,
}

#[derive(Debug)]
struct Node<T> {
    value: T,
    parent: Option<usize>,
    left: Option<usize>,
    right: Option<usize>,
    prev: Option<usize>,
    next: Option<usize>,
    red: bool,
}

impl<T> Default for RedBlackTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RedBlackTree<T> {
    pub fn new() -> Self {
        RedBlackTree {
            nodes: Slab::new(),
            root: None,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Drop all nodes, keeping the arena's allocation for reuse.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.root = None;
    }

    pub fn root(&self) -> Option<usize> {
        self.root
    }

    pub fn left(&self, key: usize) -> Option<usize> {
        self.nodes[key].left
    }

    pub fn right(&self, key: usize) -> Option<usize> {
        self.nodes[key].right
    }

    /// In-order predecessor, O(1).
    pub fn prev(&self, key: usize) -> Option<usize> {
        self.nodes[key].prev
    }

    /// In-order successor, O(1).
    pub fn next(&self, key: usize) -> Option<usize> {
        self.nodes[key].next
    }

    /// Leftmost node of the whole tree.
    pub fn first(&self) -> Option<usize> {
        self.root.map(|n| self.first_from(n))
    }

    /// Rightmost node of the whole tree.
    pub fn last(&self) -> Option<usize> {
        self.root.map(|n| self.last_from(n))
    }

    pub fn get_mut(&mut self, key: usize) -> &mut T {
        &mut self.nodes[key].value
    }

    fn first_from(&self, mut node: usize) -> usize {
        while let Some(left) = self.nodes[node].left {
            node = left;
        }
        node
    }

    fn last_from(&self, mut node: usize) -> usize {
        while let Some(right) = self.nodes[node].right {
            node = right;
        }
        node
    }

    /// Insert `value` immediately after `node` in traversal order, or
    /// at the very front when `node` is `None`. Returns the new key.
    pub fn insert_successor(&mut self, node: Option<usize>, value: T) -> usize {
        let key = self.nodes.insert(Node {
            value,
            parent: None,
            left: None,
            right: None,
            prev: None,
            next: None,
            red: true,
        });

        let parent = match node {
            Some(node) => {
                // Splice into the linked list after `node`.
                let node_next = self.nodes[node].next;
                self.nodes[key].prev = Some(node);
                self.nodes[key].next = node_next;
                if let Some(next) = node_next {
                    self.nodes[next].prev = Some(key);
                }
                self.nodes[node].next = Some(key);

                // The tree position right after `node` is either its
                // vacant right child, or the leftmost slot under it.
                match self.nodes[node].right {
                    Some(right) => {
                        let leftmost = self.first_from(right);
                        self.nodes[leftmost].left = Some(key);
                        Some(leftmost)
                    }
                    None => {
                        self.nodes[node].right = Some(key);
                        Some(node)
                    }
                }
            }
            None => match self.root {
                Some(root) => {
                    let leftmost = self.first_from(root);
                    self.nodes[key].next = Some(leftmost);
                    self.nodes[leftmost].prev = Some(key);
                    self.nodes[leftmost].left = Some(key);
                    Some(leftmost)
                }
                None => {
                    self.root = Some(key);
                    None
                }
            },
        };
        self.nodes[key].parent = parent;
        self.insert_fixup(key);
        key
    }

    fn insert_fixup(&mut self, mut node: usize) {
        while let Some(parent) = self.nodes[node].parent {
            if !self.nodes[parent].red {
                break;
            }
            let grandpa = self.nodes[parent]
                .parent
                .expect("red node cannot be the root");
            let parent_is_left = self.nodes[grandpa].left == Some(parent);
            let uncle = if parent_is_left {
                self.nodes[grandpa].right
            } else {
                self.nodes[grandpa].left
            };
            if let Some(uncle) = uncle.filter(|&u| self.nodes[u].red) {
                self.nodes[parent].red = false;
                self.nodes[uncle].red = false;
                self.nodes[grandpa].red = true;
                node = grandpa;
            } else if parent_is_left {
                if self.nodes[parent].right == Some(node) {
                    self.rotate_left(parent);
                    node = parent;
                }
                let parent = self.nodes[node].parent.expect("rotation keeps the parent");
                self.nodes[parent].red = false;
                self.nodes[grandpa].red = true;
                self.rotate_right(grandpa);
            } else {
                if self.nodes[parent].left == Some(node) {
                    self.rotate_right(parent);
                    node = parent;
                }
                let parent = self.nodes[node].parent.expect("rotation keeps the parent");
                self.nodes[parent].red = false;
                self.nodes[grandpa].red = true;
                self.rotate_left(grandpa);
            }
        }
        let root = self.root.expect("fixup runs on a non-empty tree");
        self.nodes[root].red = false;
    }

    /// Remove a node, returning its payload. The slot is recycled by
    /// later insertions.
    pub fn remove(&mut self, node: usize) -> T {
        // Unlink from the traversal list first.
        let list_prev = self.nodes[node].prev;
        let list_next = self.nodes[node].next;
        if let Some(next) = list_next {
            self.nodes[next].prev = list_prev;
        }
        if let Some(prev) = list_prev {
            self.nodes[prev].next = list_next;
        }

        let mut parent = self.nodes[node].parent;
        let left = self.nodes[node].left;
        let right = self.nodes[node].right;

        // Replacement: single child, or the in-order successor when
        // both children are present.
        let next = match (left, right) {
            (None, _) => right,
            (_, None) => left,
            (Some(_), Some(right)) => Some(self.first_from(right)),
        };

        match parent {
            Some(parent) => {
                if self.nodes[parent].left == Some(node) {
                    self.nodes[parent].left = next;
                } else {
                    self.nodes[parent].right = next;
                }
            }
            None => self.root = next,
        }

        // `fix_node` is the subtree that moved into the removed
        // position; `parent` its new parent, for the fixup walk.
        let removed_red;
        let fix_node;
        if let (Some(left), Some(right)) = (left, right) {
            let succ = next.expect("two children imply a successor");
            removed_red = self.nodes[succ].red;
            self.nodes[succ].red = self.nodes[node].red;
            self.nodes[succ].left = Some(left);
            self.nodes[left].parent = Some(succ);
            if succ != right {
                let succ_parent = self.nodes[succ].parent;
                self.nodes[succ].parent = self.nodes[node].parent;
                fix_node = self.nodes[succ].right;
                parent = succ_parent;
                self.nodes[succ_parent.expect("successor below right child has a parent")].left =
                    fix_node;
                self.nodes[succ].right = Some(right);
                self.nodes[right].parent = Some(succ);
            } else {
                self.nodes[succ].parent = parent;
                parent = Some(succ);
                fix_node = self.nodes[succ].right;
            }
        } else {
            removed_red = self.nodes[node].red;
            fix_node = next;
        }
        if let Some(fix) = fix_node {
            self.nodes[fix].parent = parent;
        }

        let value = self.nodes.remove(node).value;

        if removed_red {
            return value;
        }
        if let Some(fix) = fix_node {
            if self.nodes[fix].red {
                self.nodes[fix].red = false;
                return value;
            }
        }
        self.remove_fixup(fix_node, parent);
        value
    }

    fn remove_fixup(&mut self, mut node: Option<usize>, mut parent: Option<usize>) {
        loop {
            if node == self.root {
                break;
            }
            let p = parent.expect("non-root fixup node has a parent");
            let node_is_left = self.nodes[p].left == node;
            let mut sibling = if node_is_left {
                self.nodes[p].right
            } else {
                self.nodes[p].left
            }
            .expect("black-height invariant guarantees a sibling");

            if node_is_left {
                if self.nodes[sibling].red {
                    self.nodes[sibling].red = false;
                    self.nodes[p].red = true;
                    self.rotate_left(p);
                    sibling = self.nodes[p].right.expect("rotation keeps a right child");
                }
                let red_left = self.nodes[sibling]
                    .left
                    .map_or(false, |n| self.nodes[n].red);
                let red_right = self.nodes[sibling]
                    .right
                    .map_or(false, |n| self.nodes[n].red);
                if red_left || red_right {
                    if !red_right {
                        let sl = self.nodes[sibling].left.expect("red left child");
                        self.nodes[sl].red = false;
                        self.nodes[sibling].red = true;
                        self.rotate_right(sibling);
                        sibling = self.nodes[p].right.expect("rotation keeps a right child");
                    }
                    self.nodes[sibling].red = self.nodes[p].red;
                    self.nodes[p].red = false;
                    let sr = self.nodes[sibling].right.expect("red right child");
                    self.nodes[sr].red = false;
                    self.rotate_left(p);
                    node = self.root;
                    break;
                }
            } else {
                if self.nodes[sibling].red {
                    self.nodes[sibling].red = false;
                    self.nodes[p].red = true;
                    self.rotate_right(p);
                    sibling = self.nodes[p].left.expect("rotation keeps a left child");
                }
                let red_left = self.nodes[sibling]
                    .left
                    .map_or(false, |n| self.nodes[n].red);
                let red_right = self.nodes[sibling]
                    .right
                    .map_or(false, |n| self.nodes[n].red);
                if red_left || red_right {
                    if !red_left {
                        let sr = self.nodes[sibling].right.expect("red right child");
                        self.nodes[sr].red = false;
                        self.nodes[sibling].red = true;
                        self.rotate_left(sibling);
                        sibling = self.nodes[p].left.expect("rotation keeps a left child");
                    }
                    self.nodes[sibling].red = self.nodes[p].red;
                    self.nodes[p].red = false;
                    let sl = self.nodes[sibling].left.expect("red left child");
                    self.nodes[sl].red = false;
                    self.rotate_right(p);
                    node = self.root;
                    break;
                }
            }

            // Both of the sibling's children are black: push the
            // deficit one level up.
            self.nodes[sibling].red = true;
            node = Some(p);
            parent = self.nodes[p].parent;
            if self.nodes[p].red {
                break;
            }
        }
        if let Some(node) = node {
            self.nodes[node].red = false;
        }
    }

    fn rotate_left(&mut self, p: usize) {
        let q = self.nodes[p].right.expect("left rotation needs a right child");
        let parent = self.nodes[p].parent;
        match parent {
            Some(parent) => {
                if self.nodes[parent].left == Some(p) {
                    self.nodes[parent].left = Some(q);
                } else {
                    self.nodes[parent].right = Some(q);
                }
            }
            None => self.root = Some(q),
        }
        self.nodes[q].parent = parent;
        self.nodes[p].parent = Some(q);
        let moved = self.nodes[q].left;
        self.nodes[p].right = moved;
        if let Some(moved) = moved {
            self.nodes[moved].parent = Some(p);
        }
        self.nodes[q].left = Some(p);
    }

    fn rotate_right(&mut self, p: usize) {
        let q = self.nodes[p].left.expect("right rotation needs a left child");
        let parent = self.nodes[p].parent;
        match parent {
            Some(parent) => {
                if self.nodes[parent].left == Some(p) {
                    self.nodes[parent].left = Some(q);
                } else {
                    self.nodes[parent].right = Some(q);
                }
            }
            None => self.root = Some(q),
        }
        self.nodes[q].parent = parent;
        self.nodes[p].parent = Some(q);
        let moved = self.nodes[q].right;
        self.nodes[p].left = moved;
        if let Some(moved) = moved {
            self.nodes[moved].parent = Some(p);
        }
        self.nodes[q].right = Some(p);
    }
}

impl<T> Index<usize> for RedBlackTree<T> {
    type Output = T;

    fn index(&self, key: usize) -> &T {
        &self.nodes[key].value
    }
}
