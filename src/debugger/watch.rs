//! Watch expressions.
//!
//! Watch variables form a tree: top level expressions added by the user and child nodes
//! built from the fields of a structured value. Nodes live in an arena and refer to each
//! other through [`WatchId`]; the parent link is used for upward lookup only and never
//! keeps a node alive.

/// Stable address of a watch node. An id of a removed node never resolves again,
/// even if its slot is reused.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct WatchId {
    index: usize,
    generation: u32,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct WatchVariable {
    pub expression: String,
    /// Display number assigned by the debugger.
    pub handle: Option<u32>,
    /// Last known value, `None` when the value is unknown or invalid.
    pub value: Option<String>,
    parent: Option<WatchId>,
    children: Vec<WatchId>,
}

impl WatchVariable {
    fn new(expression: String, parent: Option<WatchId>) -> Self {
        Self {
            expression,
            handle: None,
            value: None,
            parent,
            children: vec![],
        }
    }

    pub fn parent(&self) -> Option<WatchId> {
        self.parent
    }

    pub fn children(&self) -> &[WatchId] {
        &self.children
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Default)]
struct Slot {
    generation: u32,
    node: Option<WatchVariable>,
}

/// Arena of watch variables.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct WatchList {
    slots: Vec<Slot>,
    free: Vec<usize>,
    roots: Vec<WatchId>,
}

impl WatchList {
    fn alloc(&mut self, var: WatchVariable) -> WatchId {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.node = Some(var);
                WatchId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(var),
                });
                WatchId {
                    index: self.slots.len() - 1,
                    generation: 0,
                }
            }
        }
    }

    fn release(&mut self, id: WatchId) -> Option<WatchVariable> {
        let slot = self.slots.get_mut(id.index)?;
        if slot.generation != id.generation {
            return None;
        }
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        Some(node)
    }

    /// Add a top level watch expression. Return `None` if the expression is already watched.
    pub fn add(&mut self, expression: impl Into<String>) -> Option<WatchId> {
        let expression = expression.into();
        if self.find(&expression).is_some() {
            return None;
        }
        let id = self.alloc(WatchVariable::new(expression, None));
        self.roots.push(id);
        Some(id)
    }

    pub fn get(&self, id: WatchId) -> Option<&WatchVariable> {
        let slot = self.slots.get(id.index)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_ref()
    }

    pub fn get_mut(&mut self, id: WatchId) -> Option<&mut WatchVariable> {
        let slot = self.slots.get_mut(id.index)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_mut()
    }

    /// Top level watches in insertion order.
    pub fn roots(&self) -> &[WatchId] {
        &self.roots
    }

    pub fn iter_roots(&self) -> impl Iterator<Item = (WatchId, &WatchVariable)> {
        self.roots
            .iter()
            .filter_map(|&id| self.get(id).map(|var| (id, var)))
    }

    /// Find a top level watch by its expression.
    pub fn find(&self, expression: &str) -> Option<WatchId> {
        self.iter_roots()
            .find(|(_, var)| var.expression == expression)
            .map(|(id, _)| id)
    }

    /// Find a top level watch by its debugger display number.
    pub fn find_by_handle(&self, handle: u32) -> Option<WatchId> {
        self.iter_roots()
            .find(|(_, var)| var.handle == Some(handle))
            .map(|(id, _)| id)
    }

    /// Number of live nodes, children included.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.node.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove a node with its whole subtree.
    pub fn remove(&mut self, id: WatchId) -> Option<WatchVariable> {
        let parent = self.get(id)?.parent;
        match parent.and_then(|p| self.get_mut(p)) {
            Some(parent) => parent.children.retain(|&c| c != id),
            None => self.roots.retain(|&r| r != id),
        }
        self.remove_subtree(id)
    }

    fn remove_subtree(&mut self, id: WatchId) -> Option<WatchVariable> {
        let node = self.release(id)?;
        for &child in &node.children {
            self.remove_subtree(child);
        }
        Some(node)
    }

    fn remove_children(&mut self, id: WatchId) {
        let children = match self.get_mut(id) {
            Some(var) => std::mem::take(&mut var.children),
            None => return,
        };
        for child in children {
            self.remove_subtree(child);
        }
    }

    /// Replace children of a node with fresh nodes built from `(expression, value)` pairs.
    pub fn set_children(&mut self, id: WatchId, fields: Vec<(String, String)>) {
        if self.get(id).is_none() {
            return;
        }
        self.remove_children(id);
        let children: Vec<WatchId> = fields
            .into_iter()
            .map(|(expression, value)| {
                let mut var = WatchVariable::new(expression, Some(id));
                var.value = Some(value);
                self.alloc(var)
            })
            .collect();
        if let Some(var) = self.get_mut(id) {
            var.children = children;
        }
    }

    pub fn rename(&mut self, id: WatchId, expression: impl Into<String>) {
        self.remove_children(id);
        if let Some(var) = self.get_mut(id) {
            var.expression = expression.into();
            var.handle = None;
            var.value = None;
        }
    }

    /// Forget the debugger handle and value of a node.
    pub fn invalidate(&mut self, id: WatchId) {
        self.remove_children(id);
        if let Some(var) = self.get_mut(id) {
            var.handle = None;
            var.value = None;
        }
    }

    pub fn invalidate_all(&mut self) {
        for id in self.roots.clone() {
            self.invalidate(id);
        }
    }

    /// Remove every node. Slots are kept so that old ids stay dead.
    pub fn clear(&mut self) {
        for root in std::mem::take(&mut self.roots) {
            self.remove_subtree(root);
        }
    }
}
