use std::collections::HashMap;

use crate::store::glob_match;

/// The expansion rules a virtual path can map to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VirtualHandler {
    /// Full counter hash for one or all interfaces
    PortCounters,
    /// Specific counter field(s) for one or all interfaces
    PortCounterFields,
    /// Queue counters for one or all interfaces
    PortQueueCounters,
    /// PFC watchdog counters for one interface/queue selection
    PortQueuePfcwd,
}

#[derive(Debug, Default)]
struct TrieNode {
    children: HashMap<String, TrieNode>,
    handler: Option<VirtualHandler>,
}

/// A trie over literal path-element sequences, mapping canonical virtual
/// paths to their expansion rule.
///
/// Node labels may carry a trailing glob (`Ethernet*`); lookup tokens `*`
/// (one level) and `...` (any depth) match anything. The search walks every
/// branch consistent with the wildcards and returns the union of handlers.
#[derive(Debug, Default)]
pub struct PathTrie {
    root: TrieNode,
}

impl PathTrie {
    pub fn new() -> Self {
        Self::default()
    }

    /// The canonical virtual paths this service serves.
    pub fn with_virtual_paths() -> Self {
        let mut trie = Self::new();
        trie.insert(
            &["COUNTERS_DB", "COUNTERS", "Ethernet*"],
            VirtualHandler::PortCounters,
        );
        trie.insert(
            &["COUNTERS_DB", "COUNTERS", "Ethernet*", "*"],
            VirtualHandler::PortCounterFields,
        );
        trie.insert(
            &["COUNTERS_DB", "COUNTERS", "Ethernet*", "Queues"],
            VirtualHandler::PortQueueCounters,
        );
        trie.insert(
            &["COUNTERS_DB", "COUNTERS", "Ethernet*", "Queues", "*"],
            VirtualHandler::PortQueueCounters,
        );
        trie.insert(
            &["COUNTERS_DB", "COUNTERS", "Ethernet*", "Queue*", "Pfcwd"],
            VirtualHandler::PortQueuePfcwd,
        );
        trie
    }

    pub fn insert(&mut self, labels: &[&str], handler: VirtualHandler) {
        let mut node = &mut self.root;
        for label in labels {
            node = node.children.entry(label.to_string()).or_default();
        }
        node.handler = Some(handler);
    }

    /// All handlers whose label sequence is consistent with `tokens`.
    pub fn find(&self, tokens: &[String]) -> Vec<VirtualHandler> {
        let mut found = Vec::new();
        Self::search(&self.root, tokens, &mut found);
        // Preserve discovery order, drop duplicates from overlapping branches.
        let mut unique = Vec::new();
        for handler in found {
            if !unique.contains(&handler) {
                unique.push(handler);
            }
        }
        unique
    }

    fn search(node: &TrieNode, tokens: &[String], found: &mut Vec<VirtualHandler>) {
        let Some(token) = tokens.first() else {
            if let Some(handler) = node.handler {
                found.push(handler);
            }
            return;
        };

        if token == "..." {
            // Any depth: consume nothing and descend, or stay and consume.
            if let Some(handler) = node.handler {
                if tokens.len() == 1 {
                    found.push(handler);
                }
            }
            for child in node.children.values() {
                Self::search(child, tokens, found);
                Self::search(child, &tokens[1..], found);
            }
            return;
        }

        let mut specific_match = false;
        for (label, child) in &node.children {
            if label != "*" && Self::label_matches(label, token) {
                specific_match = true;
                Self::search(child, &tokens[1..], found);
            }
        }
        // The catch-all label only applies when nothing more specific
        // matched, or when the token itself is the single-level wildcard.
        if token == "*" || !specific_match {
            if let Some(child) = node.children.get("*") {
                Self::search(child, &tokens[1..], found);
            }
        }
    }

    /// A request token matches a node label when either side's wildcard
    /// covers the other.
    fn label_matches(label: &str, token: &str) -> bool {
        token == "*" || label == token || glob_match(label, token)
    }
}
