/// The value shapes a write path can accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueShape {
    /// A single scalar leaf
    Scalar,
    /// A flat field-to-value map reconciled against one hash
    FieldMap,
    /// Either a flat field map or a key-to-field-map nesting
    FieldOrKeyMap,
}

/// Configuration paths writes are permitted on. A `*` entry element matches
/// any literal at that position; a request must be at least as long as the
/// entry it matches.
const CFG_PERMIT: [(&[&str], ValueShape); 6] = [
    (&["CONFIG_DB", "TELEMETRY_CLIENT"], ValueShape::FieldMap),
    (&["CONFIG_DB", "VLAN"], ValueShape::FieldOrKeyMap),
    (&["CONFIG_DB", "VLAN_MEMBER"], ValueShape::FieldOrKeyMap),
    (&["CONFIG_DB", "VLAN_INTERFACE"], ValueShape::FieldOrKeyMap),
    (&["CONFIG_DB", "BGP_NETWORK"], ValueShape::FieldMap),
    (
        &["CONFIG_DB", "PORT", "*", "admin_status"],
        ValueShape::Scalar,
    ),
];

/// Looks up the allow-list entry covering `tokens`, returning the value
/// shape it accepts, or `None` when the write is not permitted.
pub fn permitted_shape(tokens: &[String]) -> Option<ValueShape> {
    for (entry, shape) in CFG_PERMIT {
        if path_permits(tokens, entry) {
            return Some(shape);
        }
    }
    None
}

fn path_permits(tokens: &[String], entry: &[&str]) -> bool {
    if tokens.len() < entry.len() {
        return false;
    }
    tokens
        .iter()
        .zip(entry)
        .all(|(token, pat)| *pat == "*" || token == pat)
}
