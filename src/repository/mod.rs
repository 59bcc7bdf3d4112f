//! Typed, read-only access to the narrative store.
//!
//! All predicates built from caller input use bound parameters; the only
//! interpolated identifiers are the static per-dimension table names.

pub mod chunks;
pub mod entities;
pub mod hybrid;
pub mod sql;

use sqlx::{Postgres, QueryBuilder};

use crate::models::Filters;

pub use chunks::ChunkRepository;
pub use entities::EntityRepository;

/// Append metadata filter predicates to a query under construction.
/// `alias` names the `chunk_metadata` table in the surrounding query.
fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filters: &Filters, alias: &str) {
    if let Some(season) = filters.season {
        builder.push(format!(" AND {alias}.season = "));
        builder.push_bind(season);
    }
    if let Some(episode) = filters.episode {
        builder.push(format!(" AND {alias}.episode = "));
        builder.push_bind(episode);
    }
    if let Some(world_layer) = &filters.world_layer {
        builder.push(format!(" AND {alias}.world_layer = "));
        builder.push_bind(world_layer.clone());
    }
}
