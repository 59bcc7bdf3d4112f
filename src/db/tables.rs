//! Embedding tables are partitioned by vector dimensionality. The set of
//! dimensions is a static fact of the schema; the storage adapter picks the
//! table from the query vector's length.

pub const DIMENSION_TABLES: &[(usize, &str)] = &[
    (1024, "chunk_embeddings_1024d"),
    (1536, "chunk_embeddings_1536d"),
];

/// Return the embedding table that stores vectors of the given length.
pub fn resolve_dimension_table(dimensions: usize) -> Option<&'static str> {
    DIMENSION_TABLES
        .iter()
        .find(|(d, _)| *d == dimensions)
        .map(|(_, table)| *table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_dimensions_resolve() {
        assert_eq!(resolve_dimension_table(1024), Some("chunk_embeddings_1024d"));
        assert_eq!(resolve_dimension_table(1536), Some("chunk_embeddings_1536d"));
    }

    #[test]
    fn unknown_dimensions_do_not_resolve() {
        assert_eq!(resolve_dimension_table(0), None);
        assert_eq!(resolve_dimension_table(384), None);
        assert_eq!(resolve_dimension_table(4096), None);
    }
}
