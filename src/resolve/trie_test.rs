use super::PathTrie;
use super::VirtualHandler;

fn tokens(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

#[test]
fn test_literal_port_path() {
    let trie = PathTrie::with_virtual_paths();
    let found = trie.find(&tokens(&["COUNTERS_DB", "COUNTERS", "Ethernet68"]));
    assert_eq!(found, vec![VirtualHandler::PortCounters]);
}

#[test]
fn test_wildcard_port_path() {
    let trie = PathTrie::with_virtual_paths();
    let found = trie.find(&tokens(&["COUNTERS_DB", "COUNTERS", "Ethernet*"]));
    assert_eq!(found, vec![VirtualHandler::PortCounters]);
}

#[test]
fn test_field_path_hits_catch_all() {
    let trie = PathTrie::with_virtual_paths();
    let found = trie.find(&tokens(&[
        "COUNTERS_DB",
        "COUNTERS",
        "Ethernet68",
        "SAI_PORT_STAT_PFC_7_RX_PKTS",
    ]));
    assert_eq!(found, vec![VirtualHandler::PortCounterFields]);
}

#[test]
fn test_queues_prefers_literal_over_catch_all() {
    let trie = PathTrie::with_virtual_paths();
    let found = trie.find(&tokens(&["COUNTERS_DB", "COUNTERS", "Ethernet*", "Queues"]));
    assert_eq!(found, vec![VirtualHandler::PortQueueCounters]);
}

#[test]
fn test_pfcwd_path() {
    let trie = PathTrie::with_virtual_paths();
    let found = trie.find(&tokens(&[
        "COUNTERS_DB",
        "COUNTERS",
        "Ethernet68",
        "Queue3",
        "Pfcwd",
    ]));
    assert_eq!(found, vec![VirtualHandler::PortQueuePfcwd]);
}

#[test]
fn test_single_level_wildcard_token_unions_branches() {
    let trie = PathTrie::with_virtual_paths();
    let found = trie.find(&tokens(&["COUNTERS_DB", "COUNTERS", "Ethernet68", "*"]));
    assert!(found.contains(&VirtualHandler::PortCounterFields));
    assert!(found.contains(&VirtualHandler::PortQueueCounters));
}

#[test]
fn test_any_depth_wildcard() {
    let trie = PathTrie::with_virtual_paths();
    let found = trie.find(&tokens(&["COUNTERS_DB", "...", "Queues"]));
    assert_eq!(found, vec![VirtualHandler::PortQueueCounters]);
}

#[test]
fn test_unknown_path_finds_nothing() {
    let trie = PathTrie::with_virtual_paths();
    assert!(trie
        .find(&tokens(&["COUNTERS_DB", "COUNTERS_PORT_NAME_MAP"]))
        .is_empty());
    assert!(trie.find(&tokens(&["CONFIG_DB", "PORT"])).is_empty());
}
