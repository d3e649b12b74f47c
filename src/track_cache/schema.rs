use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP};

/// Track metadata and, once known, its audio features.
///
/// `has_features` is 0 until a feature vector has been stored; from then on
/// the feature columns are never rewritten.
const TRACKS_TABLE_V1: Table = Table {
    name: "tracks",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("artist_name", &SqlType::Text, non_null = true),
        sqlite_column!("album_art_url", &SqlType::Text),
        sqlite_column!("duration_ms", &SqlType::Integer, non_null = true),
        sqlite_column!("explicit", &SqlType::Integer, non_null = true),
        sqlite_column!("external_url", &SqlType::Text),
        sqlite_column!("uri", &SqlType::Text, non_null = true),
        sqlite_column!("popularity", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "has_features",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("key", &SqlType::Integer),
        sqlite_column!("mode", &SqlType::Integer),
        sqlite_column!("tempo", &SqlType::Real),
        sqlite_column!("energy", &SqlType::Real),
        sqlite_column!("valence", &SqlType::Real),
        sqlite_column!("danceability", &SqlType::Real),
        sqlite_column!("acousticness", &SqlType::Real),
        sqlite_column!("instrumentalness", &SqlType::Real),
        sqlite_column!("liveness", &SqlType::Real),
        sqlite_column!("loudness", &SqlType::Real),
        sqlite_column!("speechiness", &SqlType::Real),
        sqlite_column!("time_signature", &SqlType::Integer),
        sqlite_column!(
            "cached_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_tracks_popularity", "popularity DESC")],
    unique_constraints: &[],
};

pub const TRACK_CACHE_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[TRACKS_TABLE_V1],
    migration: None,
}];
