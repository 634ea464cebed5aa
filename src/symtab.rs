//! Labels, segments, and forward references.

use std::collections::HashMap;

/// Segments are identified by small integers handed out by the symbol
/// table (or by the driver's output format).
pub type SegmentId = i32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub segment: Option<SegmentId>,
    pub offset: i64,
    /// False while the symbol has only been referenced, not defined.
    pub defined: bool,
}

/// The label and segment-name table the parser defines into and the
/// evaluator resolves against.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: HashMap<String, Symbol>,
    segments: HashMap<String, SegmentId>,
    next_segment: SegmentId,
    redefined: Vec<String>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    /// Define (or on a later pass, re-define) a label. Returns false when
    /// the label was already defined with a different value; the caller
    /// decides whether that is worth a diagnostic.
    pub fn define_label(
        &mut self,
        name: &str,
        segment: Option<SegmentId>,
        offset: i64,
        defining: bool,
    ) -> bool {
        match self.symbols.get_mut(name) {
            Some(sym) if sym.defined && defining => {
                let clash = sym.segment != segment || sym.offset != offset;
                sym.segment = segment;
                sym.offset = offset;
                if clash {
                    self.redefined.push(name.to_owned());
                }
                !clash
            }
            Some(sym) => {
                sym.segment = segment;
                sym.offset = offset;
                sym.defined = defining;
                true
            }
            None => {
                self.symbols.insert(
                    name.to_owned(),
                    Symbol {
                        segment,
                        offset,
                        defined: defining,
                    },
                );
                true
            }
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name).filter(|s| s.defined)
    }

    /// Register a segment name, e.g. for `wrt` targets. Idempotent.
    pub fn declare_segment(&mut self, name: &str) -> SegmentId {
        if let Some(&id) = self.segments.get(name) {
            return id;
        }
        let id = self.next_segment;
        self.next_segment += 1;
        self.segments.insert(name.to_owned(), id);
        // a segment name also resolves as a symbol: base of the segment
        self.symbols.insert(
            name.to_owned(),
            Symbol {
                segment: Some(id),
                offset: 0,
                defined: true,
            },
        );
        id
    }

    pub fn segment_id(&self, name: &str) -> Option<SegmentId> {
        self.segments.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_and_lookup() {
        let mut t = SymbolTable::new();
        assert!(t.lookup("foo").is_none());
        assert!(t.define_label("foo", Some(0), 16, true));
        let sym = t.lookup("foo").unwrap();
        assert_eq!(sym.segment, Some(0));
        assert_eq!(sym.offset, 16);
    }

    #[test]
    fn redefinition_with_new_value() {
        let mut t = SymbolTable::new();
        assert!(t.define_label("foo", Some(0), 16, true));
        assert!(!t.define_label("foo", Some(0), 32, true));
        assert_eq!(t.lookup("foo").unwrap().offset, 32);
    }

    #[test]
    fn segments() {
        let mut t = SymbolTable::new();
        let text = t.declare_segment(".text");
        let data = t.declare_segment(".data");
        assert_ne!(text, data);
        assert_eq!(t.declare_segment(".text"), text);
        assert_eq!(t.lookup(".data").unwrap().segment, Some(data));
    }
}
