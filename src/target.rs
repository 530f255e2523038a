//! Where compiled widget output goes.

use std::{cell::RefCell, rc::Rc};

/// The place a rendered widget is attached to. `append` is the
/// terminal action of a render, called at most once per render.
pub trait AttachTarget {
    fn append(&mut self, html: String);
}

/// Collects everything appended to it, shared with whoever wants to
/// look at it afterwards.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Rc<RefCell<Vec<String>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
}

impl AttachTarget for SharedBuffer {
    fn append(&mut self, html: String) {
        self.0.borrow_mut().push(html)
    }
}
