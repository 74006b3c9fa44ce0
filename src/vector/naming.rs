//! Deterministic vector-collection naming.
//!
//! Deletion reconstructs names from `(owner, collection, schema_name)`, so the
//! rules here are part of the storage contract and must not drift.

/// Replace every character outside `[A-Za-z0-9_]` with `_`, lowercase, and
/// prefix `r_` when the result starts with a digit.
pub fn sanitize(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    if replaced.starts_with(|c: char| c.is_ascii_digit()) {
        format!("r_{replaced}")
    } else {
        replaced
    }
}

/// Name of the vector collection holding `dimensions`-long vectors for one
/// `(owner, collection, schema_name)`.
pub fn collection_name(owner: &str, collection: &str, schema_name: &str, dimensions: usize) -> String {
    sanitize(&format!("rows_{owner}_{collection}_{schema_name}_{dimensions}"))
}

/// Prefix shared by every dimensionality of one `(owner, collection, schema_name)`.
pub fn schema_prefix(owner: &str, collection: &str, schema_name: &str) -> String {
    sanitize(&format!("rows_{owner}_{collection}_{schema_name}_"))
}

/// Whether `name` belongs to the schema whose prefix is `prefix`.
///
/// The remainder after the prefix must be the dimensionality alone, so schema
/// `y` does not claim the collections of schema `y_z`.
pub fn matches_schema_prefix(name: &str, prefix: &str) -> bool {
    name.strip_prefix(prefix)
        .map(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
        .unwrap_or(false)
}

/// Dimensionality encoded in a collection name, if it has one.
pub fn dimensions_of(name: &str) -> Option<usize> {
    name.rsplit('_').next().and_then(|tail| tail.parse().ok())
}
