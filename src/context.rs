use core::cell::{Cell, RefCell};
use core::fmt;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::error::{ExprError, Result};
use crate::namespace::Namespace;
use crate::value::Value;

/// A name-to-value table with an optional parent.
///
/// Lookups walk the chain of ancestors, then the namespace, then the unit table. Writes
/// always land in the scope they are made on; a scope never writes into its parent.
///
/// A scope holds its parent weakly. Its creator must keep the parent alive for as long as
/// lookups through the parent are expected to succeed; once the parent is dropped the
/// chain simply ends at the child.
///
/// Successful ancestor lookups are remembered in a per-scope cache that maps a name to the
/// ancestor that owns it. Any insertion of a new name, removal or clear anywhere in the
/// tree invalidates every cache entry, so a cached hit is never stale.
///
/// # Examples
///
/// ```
/// use exp_sandbox::context::Scope;
/// use exp_sandbox::value::Value;
///
/// let parent = Scope::new();
/// parent.set("x", Value::Number(1.0));
///
/// let child = parent.create_sub_scope();
/// child.set("y", Value::Number(2.0));
///
/// assert_eq!(child.get("x"), Some(Value::Number(1.0)));
/// assert!(parent.get("y").is_none());
/// ```
#[derive(Clone)]
pub struct Scope {
    inner: Rc<ScopeInner>,
}

struct ScopeInner {
    symbols: RefCell<HashMap<String, Value>>,
    parent: Weak<ScopeInner>,
    children: RefCell<Vec<Weak<ScopeInner>>>,
    cache: RefCell<HashMap<String, CacheEntry>>,
    /// Shared by every scope of one tree; bumped whenever a lookup could change owner.
    generation: Rc<Cell<u64>>,
    namespace: Rc<Namespace>,
}

struct CacheEntry {
    owner: Weak<ScopeInner>,
    generation: u64,
}

/// Non-owning handle to a scope, held by user-defined functions.
#[derive(Clone, Default)]
pub struct WeakScope(Weak<ScopeInner>);

impl WeakScope {
    pub fn upgrade(&self) -> Option<Scope> {
        self.0.upgrade().map(|inner| Scope { inner })
    }
}

/// The scope a user-defined function was defined in.
///
/// A root scope is held weakly. Any other scope, such as the locals of a running call, is
/// held strongly so that a function returned from a call stays callable. The function is
/// also bound in that scope, so the pair forms a cycle until [`Scope::clear`] is called on
/// an ancestor.
#[derive(Clone)]
pub enum DefinitionScope {
    Root(WeakScope),
    Local(Scope),
}

impl DefinitionScope {
    pub fn capture(scope: &Scope) -> Self {
        if scope.parent().is_some() {
            DefinitionScope::Local(scope.clone())
        } else {
            DefinitionScope::Root(scope.downgrade())
        }
    }

    pub fn upgrade(&self) -> Option<Scope> {
        match self {
            DefinitionScope::Root(weak) => weak.upgrade(),
            DefinitionScope::Local(scope) => Some(scope.clone()),
        }
    }
}

impl Scope {
    /// Creates a root scope over the built-in namespace.
    pub fn new() -> Self {
        Self::with_namespace(Namespace::builtin())
    }

    /// Creates a root scope over `namespace`.
    pub fn with_namespace(namespace: Rc<Namespace>) -> Self {
        Self {
            inner: Rc::new(ScopeInner {
                symbols: RefCell::new(HashMap::new()),
                parent: Weak::new(),
                children: RefCell::new(Vec::new()),
                cache: RefCell::new(HashMap::new()),
                generation: Rc::new(Cell::new(0)),
                namespace,
            }),
        }
    }

    /// Creates an empty child whose lookups fall back to this scope.
    ///
    /// The child shares this scope's namespace. The parent records the child weakly so
    /// that [`Scope::clear`] can reach it.
    pub fn create_sub_scope(&self) -> Scope {
        let child = Rc::new(ScopeInner {
            symbols: RefCell::new(HashMap::new()),
            parent: Rc::downgrade(&self.inner),
            children: RefCell::new(Vec::new()),
            cache: RefCell::new(HashMap::new()),
            generation: Rc::clone(&self.inner.generation),
            namespace: Rc::clone(&self.inner.namespace),
        });
        let mut children = self.inner.children.borrow_mut();
        children.retain(|c| c.strong_count() > 0);
        children.push(Rc::downgrade(&child));
        Scope { inner: child }
    }

    /// Resolves `name`: own table, cached ancestor, ancestor walk, namespace, unit table.
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.inner.symbols.borrow().get(name) {
            return Some(value.clone());
        }

        if let Some(value) = self.cached(name) {
            trace!(name, "scope cache hit");
            return Some(value);
        }

        let mut current = self.inner.parent.upgrade();
        while let Some(scope) = current {
            if let Some(value) = scope.symbols.borrow().get(name) {
                self.inner.cache.borrow_mut().insert(
                    name.to_string(),
                    CacheEntry {
                        owner: Rc::downgrade(&scope),
                        generation: self.inner.generation.get(),
                    },
                );
                return Some(value.clone());
            }
            current = scope.parent.upgrade();
        }

        self.inner
            .namespace
            .get(name)
            .or_else(|| self.inner.namespace.unit(name))
    }

    fn cached(&self, name: &str) -> Option<Value> {
        let owner = {
            let cache = self.inner.cache.borrow();
            let entry = cache.get(name)?;
            if entry.generation == self.inner.generation.get() {
                entry.owner.upgrade()
            } else {
                None
            }
        };
        let value = owner.and_then(|scope| {
            let symbols = scope.symbols.borrow();
            symbols.get(name).cloned()
        });
        match value {
            Some(value) => Some(value),
            None => {
                self.inner.cache.borrow_mut().remove(name);
                None
            }
        }
    }

    /// Like [`Scope::get`] but reports an unresolved name as an error.
    pub fn resolve(&self, name: &str) -> Result<Value> {
        self.get(name).ok_or_else(|| ExprError::UndefinedSymbol {
            name: name.to_string(),
        })
    }

    /// Binds `name` in this scope, returning the previous local value.
    pub fn set(&self, name: impl Into<String>, value: Value) -> Option<Value> {
        let previous = self.inner.symbols.borrow_mut().insert(name.into(), value);
        if previous.is_none() {
            self.invalidate();
        }
        previous
    }

    /// True only for names bound in this scope's own table.
    pub fn has(&self, name: &str) -> bool {
        self.inner.symbols.borrow().contains_key(name)
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        let removed = self.inner.symbols.borrow_mut().remove(name);
        if removed.is_some() {
            self.invalidate();
        }
        removed
    }

    /// Empties this scope and, recursively, every live descendant.
    pub fn clear(&self) {
        trace!("clearing scope");
        self.invalidate();
        self.clear_tree();
    }

    fn clear_tree(&self) {
        self.inner.symbols.borrow_mut().clear();
        self.inner.cache.borrow_mut().clear();
        let children: Vec<Scope> = self
            .inner
            .children
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .map(|inner| Scope { inner })
            .collect();
        for child in children {
            child.clear_tree();
        }
    }

    fn invalidate(&self) {
        let generation = &self.inner.generation;
        generation.set(generation.get().wrapping_add(1));
    }

    /// Names bound in this scope's own table, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.symbols.borrow().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    pub fn namespace(&self) -> Rc<Namespace> {
        Rc::clone(&self.inner.namespace)
    }

    /// The parent, if it is still alive.
    pub fn parent(&self) -> Option<Scope> {
        self.inner.parent.upgrade().map(|inner| Scope { inner })
    }

    pub fn downgrade(&self) -> WeakScope {
        WeakScope(Rc::downgrade(&self.inner))
    }

    pub fn ptr_eq(&self, other: &Scope) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    #[cfg(test)]
    fn cache_len(&self) -> usize {
        self.inner.cache.borrow().len()
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("names", &self.names())
            .field("has_parent", &self.parent().is_some())
            .finish()
    }
}
