use std::collections::HashMap;

/// Binding strength of the single-character binary operators.
#[derive(Debug, Clone)]
pub struct OperatorTable {
    precedence: HashMap<char, i32>,
}

impl Default for OperatorTable {
    fn default() -> Self {
        let precedence = [('=', 2), ('<', 10), ('+', 20), ('-', 20), ('*', 40)]
            .iter()
            .cloned()
            .collect();
        OperatorTable { precedence }
    }
}

impl OperatorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// `-1` for anything that is not a known binary operator.
    pub fn precedence(&self, op: char) -> i32 {
        match self.precedence.get(&op) {
            Some(&p) if p > 0 => p,
            _ => -1,
        }
    }

    /// Returns the precedence the symbol had before, if any.
    pub fn insert(&mut self, op: char, prec: i32) -> Option<i32> {
        self.precedence.insert(op, prec)
    }

    /// Undo an `insert`, given what it returned.
    pub fn restore(&mut self, op: char, previous: Option<i32>) {
        match previous {
            Some(p) => {
                self.precedence.insert(op, p);
            }
            None => {
                self.precedence.remove(&op);
            }
        }
    }
}
