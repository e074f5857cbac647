use std::{cell::RefCell, fmt, rc::Rc};

#[derive(Debug)]
struct StrBuf {
    // Always ends in a single nul that is not part of the contents.
    bytes: Vec<u8>,
}

impl StrBuf {
    fn from_bytes(s: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(s.len() + 1);
        bytes.extend_from_slice(s);
        bytes.push(0);
        Self { bytes }
    }

    fn contents(&self) -> &[u8] {
        &self.bytes[..self.bytes.len() - 1]
    }

    fn put(&mut self, s: &[u8]) {
        let end = self.bytes.len() - 1;
        self.bytes.splice(end..end, s.iter().copied());
    }
}

/// Shared, mutable byte string.
#[derive(Debug, Clone)]
pub struct StrHandle(Rc<RefCell<StrBuf>>);

impl StrHandle {
    pub fn new(s: &str) -> Self {
        Self::from_bytes(s.as_bytes())
    }

    pub fn from_bytes(s: &[u8]) -> Self {
        Self(Rc::new(RefCell::new(StrBuf::from_bytes(s))))
    }

    /// Length in bytes, excluding the terminator.
    pub fn len(&self) -> usize {
        self.0.borrow().bytes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.0.borrow().bytes.capacity()
    }

    pub fn nref(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    pub fn push_byte(&self, c: u8) {
        self.0.borrow_mut().put(&[c]);
    }

    pub fn push_str(&self, s: &str) {
        self.0.borrow_mut().put(s.as_bytes());
    }

    /// Append another string's contents; safe when `other` aliases `self`.
    pub fn push_handle(&self, other: &StrHandle) {
        let tail = other.to_bytes();
        self.0.borrow_mut().put(&tail);
    }

    pub fn assign(&self, s: &[u8]) {
        *self.0.borrow_mut() = StrBuf::from_bytes(s);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.borrow().contents().to_vec()
    }

    pub fn byte_at(&self, idx: usize) -> Option<u8> {
        self.0.borrow().contents().get(idx).copied()
    }

    /// Borrow the contents together with the trailing nul.
    pub fn with_terminated<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&self.0.borrow().bytes)
    }

    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(self.0.borrow().contents())
    }

    /// New string holding `a` followed by `b`.
    pub fn concat(a: &StrHandle, b: &StrHandle) -> StrHandle {
        let out = StrHandle::from_bytes(&a.to_bytes());
        out.push_handle(b);
        out
    }

    pub(crate) fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

impl PartialEq for StrHandle {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0) || self.with_bytes(|a| other.with_bytes(|b| a == b))
    }
}

impl fmt::Display for StrHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with_bytes(|b| f.write_str(&String::from_utf8_lossy(b)))
    }
}
