//! Undo/redo records.
//!
//! Each change is stored as a forward and an inverse [`Mutation`]. Undo
//! replays the inverse and redo the forward, both through the session's
//! public entry points with recording suppressed.

use echoform_spec::{AutomationDef, Connection, NodeDef, ParamValue, SendDef};
use std::collections::VecDeque;

/// Category of a recorded change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Parameter write.
    Param,
    /// Automation added or removed.
    Automation,
    /// Node added or removed.
    Node,
    /// Connection added or removed.
    Connection,
}

/// A replayable edit.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Set a parameter, or remove it from the spec (back to its default)
    /// when `value` is `None`.
    SetParam {
        /// Node id.
        node: String,
        /// Parameter name.
        param: String,
        /// Value to store.
        value: Option<ParamValue>,
    },
    /// Add an automation.
    AddAutomation(AutomationDef),
    /// Remove an automation by id.
    RemoveAutomation(String),
    /// Insert a node with the wiring it had when removed.
    InsertNode {
        /// Node declaration.
        node: NodeDef,
        /// Connections touching the node.
        connections: Vec<Connection>,
        /// Automations targeting the node.
        automations: Vec<AutomationDef>,
        /// Sends from the node.
        sends: Vec<SendDef>,
    },
    /// Remove a node and everything that references it.
    RemoveNode(String),
    /// Add a connection.
    Connect(Connection),
    /// Remove a connection.
    Disconnect(Connection),
}

/// One undoable change.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    /// Category.
    pub kind: ChangeKind,
    /// Re-applies the change.
    pub forward: Mutation,
    /// Reverts the change.
    pub inverse: Mutation,
}

/// Bounded undo stack plus redo stack.
#[derive(Debug, Clone)]
pub struct History {
    undo: VecDeque<ChangeRecord>,
    redo: Vec<ChangeRecord>,
    limit: usize,
}

impl History {
    /// Creates an empty history keeping at most `limit` undo records.
    pub fn new(limit: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            limit: limit.max(1),
        }
    }

    /// Records a fresh change. Clears the redo stack.
    pub fn record(&mut self, record: ChangeRecord) {
        self.redo.clear();
        self.push_undo(record);
    }

    /// Pops the most recent change to undo.
    pub fn pop_undo(&mut self) -> Option<ChangeRecord> {
        self.undo.pop_back()
    }

    /// Pops the most recently undone change.
    pub fn pop_redo(&mut self) -> Option<ChangeRecord> {
        self.redo.pop()
    }

    /// Pushes onto the undo stack without touching redo.
    pub fn push_undo(&mut self, record: ChangeRecord) {
        if self.undo.len() == self.limit {
            self.undo.pop_front();
        }
        self.undo.push_back(record);
    }

    /// Pushes onto the redo stack.
    pub fn push_redo(&mut self, record: ChangeRecord) {
        self.redo.push(record);
    }

    /// Number of undoable changes.
    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    /// Number of redoable changes.
    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    /// Drops every record.
    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(n: usize) -> ChangeRecord {
        ChangeRecord {
            kind: ChangeKind::Node,
            forward: Mutation::RemoveNode(format!("n{n}")),
            inverse: Mutation::RemoveNode(format!("n{n}")),
        }
    }

    #[test]
    fn limit_drops_oldest() {
        let mut h = History::new(2);
        for n in 0..3 {
            h.record(record(n));
        }
        assert_eq!(h.undo_len(), 2);
        assert_eq!(h.pop_undo(), Some(record(2)));
        assert_eq!(h.pop_undo(), Some(record(1)));
        assert_eq!(h.pop_undo(), None);
    }

    #[test]
    fn fresh_record_clears_redo() {
        let mut h = History::new(10);
        h.record(record(0));
        let r = h.pop_undo().unwrap();
        h.push_redo(r);
        assert_eq!(h.redo_len(), 1);
        h.record(record(1));
        assert_eq!(h.redo_len(), 0);
    }
}
