//! Runtime environments.
//!
//! An environment is a slot vector chained to its parent. Slot order
//! matches the corresponding static scope, so a `(level, displacement)`
//! resolution indexes directly. The environment of a `with E; body` block
//! has a single slot holding the unevaluated `E` and is tagged so variable
//! lookup knows to force it on demand.

use std::cell::RefCell;
use std::rc::Rc;

use crate::source::ExprRef;
use crate::value::{Value, ValueRef, value_ref};

/// A runtime environment frame.
pub struct Env {
    /// Enclosing environment.
    pub up: Option<Rc<Env>>,
    /// Value slots in static-scope order.
    pub values: RefCell<Vec<ValueRef>>,
    /// Set when this frame belongs to a `with` block; slot 0 then holds
    /// the (possibly unevaluated) attribute-set expression.
    pub with_expr: Option<ExprRef>,
}

impl Env {
    /// Allocate an ordinary frame with `size` null-initialised slots.
    pub fn new(up: Option<Rc<Env>>, size: usize) -> Rc<Env> {
        let values = (0..size).map(|_| value_ref(Value::Null)).collect();
        Rc::new(Env { up, values: RefCell::new(values), with_expr: None })
    }

    /// Allocate the one-slot frame of a `with` block.
    pub fn with_frame(up: Option<Rc<Env>>, with_expr: ExprRef, slot: ValueRef) -> Rc<Env> {
        Rc::new(Env { up, values: RefCell::new(vec![slot]), with_expr: Some(with_expr) })
    }

    /// The frame `level` steps up the chain.
    pub fn up_by(self: &Rc<Env>, level: usize) -> Option<Rc<Env>> {
        let mut env = self.clone();
        for _ in 0..level {
            env = env.up.clone()?;
        }
        Some(env)
    }

    /// Read a slot.
    pub fn slot(&self, displ: usize) -> Option<ValueRef> {
        self.values.borrow().get(displ).cloned()
    }

    /// Write a slot, growing the vector if a tolerant caller overruns the
    /// preallocated size.
    pub fn set_slot(&self, displ: usize, value: ValueRef) {
        let mut values = self.values.borrow_mut();
        while values.len() <= displ {
            values.push(value_ref(Value::Null));
        }
        values[displ] = value;
    }

    /// Number of slots.
    pub fn size(&self) -> usize {
        self.values.borrow().len()
    }
}
