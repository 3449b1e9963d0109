//! The per-row value array threaded through the cursor tree.

use crate::symbols::Symbol;
use crate::value::TypedValue;

/// One in-flight row: a fixed-size array of values indexed by symbol
/// position.
///
/// Frames clone cheaply relative to their payload (accessor values are
/// handles), and whole-frame snapshot/restore is what `Expand` uses around
/// its remote-edge suspension points.
#[derive(Debug, Clone)]
pub struct Frame {
    elems: Vec<TypedValue>,
}

impl Frame {
    /// Creates a frame of `size` null cells.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self { elems: vec![TypedValue::Null; size] }
    }

    /// The number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elems.len()
    }

    /// Whether the frame has no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    /// Reads the cell of a symbol.
    #[inline]
    #[must_use]
    pub fn get(&self, symbol: &Symbol) -> &TypedValue {
        &self.elems[symbol.position()]
    }

    /// Mutable access to the cell of a symbol.
    #[inline]
    pub fn get_mut(&mut self, symbol: &Symbol) -> &mut TypedValue {
        &mut self.elems[symbol.position()]
    }

    /// Writes the cell of a symbol.
    #[inline]
    pub fn set(&mut self, symbol: &Symbol, value: TypedValue) {
        self.elems[symbol.position()] = value;
    }

    /// All cells in position order.
    #[must_use]
    pub fn elems(&self) -> &[TypedValue] {
        &self.elems
    }

    /// Copies out the whole row.
    #[must_use]
    pub fn snapshot(&self) -> Vec<TypedValue> {
        self.elems.clone()
    }

    /// Replaces the whole row.
    ///
    /// # Panics
    ///
    /// Panics when the element count does not match the frame size.
    pub fn restore(&mut self, elems: Vec<TypedValue>) {
        assert_eq!(elems.len(), self.elems.len(), "frame size mismatch on restore");
        self.elems = elems;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::{SymbolTable, SymbolType};

    #[test]
    fn get_set_by_symbol() {
        let mut table = SymbolTable::new();
        let x = table.create("x", SymbolType::Any, true);
        let y = table.create("y", SymbolType::Any, true);

        let mut frame = Frame::new(table.len());
        frame.set(&x, TypedValue::Int(1));
        assert_eq!(frame.get(&x), &TypedValue::Int(1));
        assert!(frame.get(&y).is_null());
    }

    #[test]
    fn snapshot_restore_roundtrip() {
        let mut table = SymbolTable::new();
        let x = table.create("x", SymbolType::Any, true);
        let mut frame = Frame::new(table.len());

        frame.set(&x, TypedValue::Int(1));
        let saved = frame.snapshot();
        frame.set(&x, TypedValue::Int(2));
        frame.restore(saved);
        assert_eq!(frame.get(&x), &TypedValue::Int(1));
    }
}
