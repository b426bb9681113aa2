//! Lexical environments.
//!
//! A scope is an ordered list of name → box bindings with a parent
//! pointer; the chain from a closure's defining scope up to the chunk
//! root is the closure's environment. Closures capture scopes (and
//! therefore boxes) by reference, which is what makes Lua upvalues
//! shared: two closures created in the same scope see each other's
//! mutations because they resolve a name to the same box.
//!
//! Global access is name resolution failing over to `_ENV`: the
//! evaluator rewrites a bare `name` that reaches the chunk root into
//! `_ENV.name`, and `_ENV` itself is an ordinary local declared by the
//! main chunk.

use smol_str::SmolStr;
use std::cell::RefCell;
use std::rc::Rc;

use crate::gc::BoxId;

/// Declaration attribute of a local binding.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum VarAttrib {
    Regular,
    /// `<const>`: reassignment is rejected by the parser.
    Const,
    /// `<close>`: the box participates in scoped release.
    Close,
}

struct Binding {
    name: SmolStr,
    cell: BoxId,
    attrib: VarAttrib,
}

/// One lexical scope. Scopes are shared (`Rc`) because closures keep
/// their defining scope alive after the block exits.
pub struct Scope {
    vars: RefCell<Vec<Binding>>,
    parent: Option<Rc<Scope>>,
}

impl Scope {
    pub fn root() -> Rc<Scope> {
        Rc::new(Scope {
            vars: RefCell::new(Vec::new()),
            parent: None,
        })
    }

    pub fn child(parent: &Rc<Scope>) -> Rc<Scope> {
        Rc::new(Scope {
            vars: RefCell::new(Vec::new()),
            parent: Some(parent.clone()),
        })
    }

    /// Declare a new binding. Shadowing an earlier declaration of the
    /// same name in this scope is allowed; lookup scans newest-first.
    pub fn declare(&self, name: SmolStr, attrib: VarAttrib, cell: BoxId) {
        self.vars.borrow_mut().push(Binding { name, cell, attrib });
    }

    /// Resolve a name against this scope chain.
    pub fn lookup(self: &Rc<Scope>, name: &str) -> Option<(BoxId, VarAttrib)> {
        let mut scope = self.clone();
        loop {
            if let Some(found) = scope
                .vars
                .borrow()
                .iter()
                .rev()
                .find(|b| b.name == name)
                .map(|b| (b.cell, b.attrib))
            {
                return Some(found);
            }
            match &scope.parent {
                Some(p) => {
                    let next = p.clone();
                    scope = next;
                }
                None => return None,
            }
        }
    }

    /// Boxes declared `<close>` in this scope, in declaration order.
    pub fn close_list(&self) -> Vec<BoxId> {
        self.vars
            .borrow()
            .iter()
            .filter(|b| b.attrib == VarAttrib::Close)
            .map(|b| b.cell)
            .collect()
    }

    /// All boxes of this single scope, for GC tracing.
    pub fn own_cells(&self) -> Vec<BoxId> {
        self.vars.borrow().iter().map(|b| b.cell).collect()
    }

    pub fn parent(&self) -> Option<&Rc<Scope>> {
        self.parent.as_ref()
    }
}
