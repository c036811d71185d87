/// Field selection of a concrete location. Exactly one shape applies.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldSpec {
    /// The whole hash.
    #[default]
    None,
    /// Explicit field names.
    Fields(Vec<String>),
    /// Prefix-anchored regex patterns over field names.
    Patterns(Vec<String>),
}

impl FieldSpec {
    /// The field name when the selection is exactly one explicit field.
    pub fn single(&self) -> Option<&str> {
        match self {
            FieldSpec::Fields(fields) if fields.len() == 1 => Some(&fields[0]),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, FieldSpec::None)
    }
}

/// A concrete store location, the resolver's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePath {
    /// Target store name
    pub target: String,
    /// Table name inside the store
    pub table: String,
    /// Key under the table; empty means "all keys matching the pattern"
    pub key: String,
    /// Key-part separator of the store
    pub separator: char,
    /// Which fields of the hash this location covers
    pub fields: FieldSpec,
    /// Presentation name to report this location under in JSON output,
    /// when the real key (an oid) should not leak into the payload
    pub json_key: Option<String>,
    /// Presentation field name, used with single-field virtual locations
    pub json_field: Option<String>,
}

impl TablePath {
    pub fn new(target: &str, table: &str, separator: char) -> Self {
        Self {
            target: target.to_string(),
            table: table.to_string(),
            key: String::new(),
            separator,
            fields: FieldSpec::None,
            json_key: None,
            json_field: None,
        }
    }

    /// The full store key this location reads: `<table><sep><key>`, or the
    /// bare table name when no key is set.
    pub fn db_key(&self) -> String {
        if self.key.is_empty() {
            self.table.clone()
        } else {
            format!("{}{}{}", self.table, self.separator, self.key)
        }
    }

    /// The listing pattern for keyless locations. Tables in the counters
    /// store other than `COUNTERS` hold their data directly under the table
    /// name, so the bare name is the pattern.
    pub fn key_pattern(&self) -> String {
        if self.target == "COUNTERS_DB" && self.table != "COUNTERS" {
            self.table.clone()
        } else {
            format!("{}{}*", self.table, self.separator)
        }
    }

    /// Strips `<table><sep>` from a listed key, leaving the key suffix used
    /// as the JSON presentation name.
    pub fn key_suffix<'a>(&self, db_key: &'a str) -> &'a str {
        let prefix_len = self.table.len() + self.separator.len_utf8();
        if db_key.len() > prefix_len && db_key.starts_with(self.table.as_str()) {
            &db_key[prefix_len..]
        } else {
            db_key
        }
    }
}
