// golo-vm - Bytecode compiler and virtual machine for the Golo programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Reference tables.
//!
//! Every block owns one table mapping names to local references. Tables form
//! a chain through their parent link; lookups walk the chain. Tables and
//! references both live in a [`ScopeArena`] and are addressed by index, so a
//! table can be relinked to a new parent without touching its children.

use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RefId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    Constant,
    Variable,
    ModuleConstant,
    ModuleVariable,
}

impl ReferenceKind {
    pub fn is_constant(&self) -> bool {
        matches!(self, ReferenceKind::Constant | ReferenceKind::ModuleConstant)
    }

    pub fn is_module_state(&self) -> bool {
        matches!(
            self,
            ReferenceKind::ModuleConstant | ReferenceKind::ModuleVariable
        )
    }
}

/// A named storage location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalReference {
    pub kind: ReferenceKind,
    pub name: String,
    /// Local slot, or module-state slot for module references. -1 until
    /// assigned.
    pub index: i32,
    pub synthetic: bool,
}

impl LocalReference {
    pub fn is_constant(&self) -> bool {
        self.kind.is_constant()
    }

    pub fn is_module_state(&self) -> bool {
        self.kind.is_module_state()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    pub entries: IndexMap<String, RefId>,
}

/// Arena holding every reference table and reference of a module.
#[derive(Debug, Clone, Default)]
pub struct ScopeArena {
    scopes: Vec<Scope>,
    refs: Vec<LocalReference>,
}

impl ScopeArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// A table without a parent.
    pub fn new_root(&mut self) -> ScopeId {
        self.push_scope(None)
    }

    /// An empty table whose parent is `parent`.
    pub fn fork(&mut self, parent: ScopeId) -> ScopeId {
        self.push_scope(Some(parent))
    }

    fn push_scope(&mut self, parent: Option<ScopeId>) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            parent,
            entries: IndexMap::new(),
        });
        id
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    pub fn parent(&self, id: ScopeId) -> Option<ScopeId> {
        self.scope(id).parent
    }

    pub fn reference(&self, id: RefId) -> &LocalReference {
        &self.refs[id.0 as usize]
    }

    pub fn reference_mut(&mut self, id: RefId) -> &mut LocalReference {
        &mut self.refs[id.0 as usize]
    }

    /// Add a reference to `scope`, replacing any entry of the same name in
    /// that table.
    pub fn declare(
        &mut self,
        scope: ScopeId,
        kind: ReferenceKind,
        name: &str,
        synthetic: bool,
    ) -> RefId {
        let id = RefId(self.refs.len() as u32);
        self.refs.push(LocalReference {
            kind,
            name: name.to_string(),
            index: -1,
            synthetic,
        });
        self.scopes[scope.0 as usize]
            .entries
            .insert(name.to_string(), id);
        id
    }

    /// Resolve `name` by walking the chain from `scope`.
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<RefId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let s = self.scope(id);
            if let Some(r) = s.entries.get(name) {
                return Some(*r);
            }
            current = s.parent;
        }
        None
    }

    pub fn has_reference_for(&self, scope: ScopeId, name: &str) -> bool {
        self.lookup(scope, name).is_some()
    }

    /// References declared directly in `scope`, in declaration order.
    pub fn owned(&self, scope: ScopeId) -> Vec<RefId> {
        self.scope(scope).entries.values().copied().collect()
    }

    pub fn owns(&self, scope: ScopeId, name: &str) -> bool {
        self.scope(scope).entries.contains_key(name)
    }

    /// Forget `name` in `scope` only.
    pub fn remove(&mut self, scope: ScopeId, name: &str) {
        self.scopes[scope.0 as usize].entries.shift_remove(name);
    }

    pub fn relink(&mut self, scope: ScopeId, parent: ScopeId) {
        if scope != parent {
            self.scopes[scope.0 as usize].parent = Some(parent);
        }
    }

    /// Every reference visible from `scope`, nearest first, one per name.
    pub fn visible(&self, scope: ScopeId) -> Vec<RefId> {
        let mut seen = IndexMap::new();
        let mut current = Some(scope);
        while let Some(id) = current {
            let s = self.scope(id);
            for (name, r) in &s.entries {
                seen.entry(name.clone()).or_insert(*r);
            }
            current = s.parent;
        }
        seen.into_values().collect()
    }

    /// A new table holding a copy of every non-module reference visible from
    /// `scope`, parented to `root` so module state still resolves.
    ///
    /// References owned by `scope` itself keep their kind; everything
    /// inherited becomes a constant. Copies are ordered by when the original
    /// was declared.
    pub fn flat_copy(&mut self, scope: ScopeId, root: ScopeId) -> ScopeId {
        let mut visible: Vec<RefId> = self
            .visible(scope)
            .into_iter()
            .filter(|r| !self.reference(*r).is_module_state())
            .collect();
        visible.sort();

        let copy = self.fork(root);
        for r in visible {
            let original = self.reference(r).clone();
            let kind = if self.owns(scope, &original.name) {
                original.kind
            } else {
                ReferenceKind::Constant
            };
            self.declare(copy, kind, &original.name, original.synthetic);
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_lookup_walks_parents() {
        let mut arena = ScopeArena::new();
        let root = arena.new_root();
        let a = arena.declare(root, ReferenceKind::ModuleVariable, "a", false);
        let child = arena.fork(root);
        let b = arena.declare(child, ReferenceKind::Variable, "b", false);
        assert_eq!(arena.lookup(child, "a"), Some(a));
        assert_eq!(arena.lookup(child, "b"), Some(b));
        assert_eq!(arena.lookup(root, "b"), None);
    }

    #[test]
    fn test_shadowing_resolves_nearest() {
        let mut arena = ScopeArena::new();
        let root = arena.new_root();
        arena.declare(root, ReferenceKind::Constant, "x", false);
        let child = arena.fork(root);
        let inner = arena.declare(child, ReferenceKind::Variable, "x", false);
        assert_eq!(arena.lookup(child, "x"), Some(inner));
        assert_eq!(arena.visible(child).len(), 1);
    }

    #[test]
    fn test_flat_copy_turns_inherited_into_constants() {
        let mut arena = ScopeArena::new();
        let root = arena.new_root();
        arena.declare(root, ReferenceKind::ModuleVariable, "state", false);
        let outer = arena.fork(root);
        arena.declare(outer, ReferenceKind::Variable, "v", false);
        let body = arena.fork(outer);
        arena.declare(body, ReferenceKind::Variable, "p", false);

        let copy = arena.flat_copy(body, root);
        assert_eq!(arena.parent(copy), Some(root));
        let names: Vec<_> = arena
            .owned(copy)
            .into_iter()
            .map(|r| arena.reference(r).clone())
            .collect();
        assert_eq!(names.len(), 2);
        assert_eq!(names[0].name, "v");
        assert_eq!(names[0].kind, ReferenceKind::Constant);
        assert_eq!(names[1].name, "p");
        assert_eq!(names[1].kind, ReferenceKind::Variable);
        assert!(arena.lookup(copy, "state").is_some());
    }

    #[test]
    fn test_relink_and_remove() {
        let mut arena = ScopeArena::new();
        let a = arena.new_root();
        let b = arena.new_root();
        arena.declare(b, ReferenceKind::Constant, "x", false);
        let child = arena.fork(a);
        assert!(!arena.has_reference_for(child, "x"));
        arena.relink(child, b);
        assert!(arena.has_reference_for(child, "x"));
        arena.remove(b, "x");
        assert!(!arena.has_reference_for(child, "x"));
    }

    const DEPTH: usize = 5;
    const NAMES: usize = 4;

    proptest! {
        // Declarations are (depth, name) pairs along one chain of tables.
        #[test]
        fn prop_lookup_resolves_nearest_declaration(
            decls in proptest::collection::vec((0..DEPTH, 0..NAMES), 0..20)
        ) {
            let mut arena = ScopeArena::new();
            let mut chain = vec![arena.new_root()];
            for depth in 1..DEPTH {
                let table = arena.fork(chain[depth - 1]);
                chain.push(table);
            }

            let mut nearest: Vec<Option<(usize, RefId)>> = vec![None; NAMES];
            let mut at_root = [false; NAMES];
            for (depth, name) in decls {
                let r = arena.declare(
                    chain[depth],
                    ReferenceKind::Variable,
                    &format!("n{}", name),
                    false,
                );
                if nearest[name].is_none_or(|(d, _)| depth >= d) {
                    nearest[name] = Some((depth, r));
                }
                at_root[name] |= depth == 0;
            }

            for name in 0..NAMES {
                let key = format!("n{}", name);
                prop_assert_eq!(
                    arena.lookup(chain[DEPTH - 1], &key),
                    nearest[name].map(|(_, r)| r)
                );
                prop_assert_eq!(arena.has_reference_for(chain[0], &key), at_root[name]);
            }
        }
    }
}
