use super::schema::TRACK_CACHE_VERSIONED_SCHEMAS;
use super::TrackStore;
use crate::catalog::{AudioDimension, AudioFeatures, CachedTrack, Track, ValueBucket};
use crate::keys::Mode;
use crate::sqlite_persistence::{open_in_memory_db, open_versioned_db};
use anyhow::{Context, Result};
use rusqlite::{params, params_from_iter, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

const TRACK_COLUMNS: &str = "id, name, artist_name, album_art_url, duration_ms, explicit, \
     external_url, uri, popularity, has_features, key, mode, tempo, energy, valence, \
     danceability, acousticness, instrumentalness, liveness, loudness, speechiness, \
     time_signature";

/// Only stored entries still lacking features are upgraded on conflict.
const UPSERT_TRACK_SQL: &str = "INSERT INTO tracks (id, name, artist_name, album_art_url, \
     duration_ms, explicit, external_url, uri, popularity, has_features, key, mode, tempo, \
     energy, valence, danceability, acousticness, instrumentalness, liveness, loudness, \
     speechiness, time_signature) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, \
     ?18, ?19, ?20, ?21, ?22) \
     ON CONFLICT(id) DO UPDATE SET \
     name = excluded.name, artist_name = excluded.artist_name, \
     album_art_url = excluded.album_art_url, duration_ms = excluded.duration_ms, \
     explicit = excluded.explicit, external_url = excluded.external_url, uri = excluded.uri, \
     popularity = excluded.popularity, has_features = 1, key = excluded.key, \
     mode = excluded.mode, tempo = excluded.tempo, energy = excluded.energy, \
     valence = excluded.valence, danceability = excluded.danceability, \
     acousticness = excluded.acousticness, instrumentalness = excluded.instrumentalness, \
     liveness = excluded.liveness, loudness = excluded.loudness, \
     speechiness = excluded.speechiness, time_signature = excluded.time_signature, \
     cached_at = (cast(strftime('%s','now') as int)) \
     WHERE tracks.has_features = 0 AND excluded.has_features = 1";

pub struct SqliteTrackStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTrackStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_db(db_path, TRACK_CACHE_VERSIONED_SCHEMAS, "track cache")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = open_in_memory_db(TRACK_CACHE_VERSIONED_SCHEMAS)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_cached_track(row: &rusqlite::Row) -> rusqlite::Result<CachedTrack> {
        let duration_ms: i64 = row.get("duration_ms")?;
        let popularity: i64 = row.get("popularity")?;
        let track = Track {
            id: row.get("id")?,
            name: row.get("name")?,
            artist_name: row.get("artist_name")?,
            album_art_url: row.get("album_art_url")?,
            duration_ms: duration_ms.max(0) as u64,
            explicit: row.get("explicit")?,
            external_url: row.get("external_url")?,
            uri: row.get("uri")?,
            popularity: popularity.clamp(0, 100) as u32,
        };

        let has_features: bool = row.get("has_features")?;
        let mode: Option<i64> = row.get("mode")?;
        let features = match (has_features, mode.and_then(|m| Mode::from_raw(m as i32))) {
            (true, Some(mode)) => {
                let time_signature: i64 = row.get::<_, Option<i64>>("time_signature")?.unwrap_or(4);
                Some(AudioFeatures {
                    key: row.get::<_, Option<i32>>("key")?.unwrap_or(-1),
                    mode,
                    tempo: row.get::<_, Option<f64>>("tempo")?.unwrap_or_default(),
                    energy: row.get::<_, Option<f64>>("energy")?.unwrap_or_default(),
                    valence: row.get::<_, Option<f64>>("valence")?.unwrap_or_default(),
                    danceability: row.get::<_, Option<f64>>("danceability")?.unwrap_or_default(),
                    acousticness: row.get::<_, Option<f64>>("acousticness")?.unwrap_or_default(),
                    instrumentalness: row
                        .get::<_, Option<f64>>("instrumentalness")?
                        .unwrap_or_default(),
                    liveness: row.get::<_, Option<f64>>("liveness")?.unwrap_or_default(),
                    loudness: row.get::<_, Option<f64>>("loudness")?.unwrap_or_default(),
                    speechiness: row.get::<_, Option<f64>>("speechiness")?.unwrap_or_default(),
                    time_signature: time_signature.max(0) as u32,
                })
            }
            _ => None,
        };
        Ok(CachedTrack::new(track, features))
    }
}

impl TrackStore for SqliteTrackStore {
    fn get_many(&self, ids: &[String]) -> Result<Vec<CachedTrack>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock().unwrap();
        let placeholders = vec!["?"; ids.len()].join(", ");
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tracks WHERE id IN ({})",
            TRACK_COLUMNS, placeholders
        ))?;
        let rows = stmt
            .query_map(params_from_iter(ids.iter()), Self::row_to_cached_track)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read cached tracks")?;
        Ok(rows)
    }

    fn put_many(&self, entries: &[CachedTrack]) -> Result<usize> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let mut changed = 0;
        {
            let mut stmt = tx.prepare_cached(UPSERT_TRACK_SQL)?;
            for entry in entries {
                let track = &entry.track;
                let f = entry.features.as_ref();
                changed += stmt.execute(params![
                    track.id,
                    track.name,
                    track.artist_name,
                    track.album_art_url,
                    track.duration_ms as i64,
                    track.explicit,
                    track.external_url,
                    track.uri,
                    track.popularity,
                    f.is_some(),
                    f.map(|f| f.key),
                    f.map(|f| f.mode.as_raw()),
                    f.map(|f| f.tempo),
                    f.map(|f| f.energy),
                    f.map(|f| f.valence),
                    f.map(|f| f.danceability),
                    f.map(|f| f.acousticness),
                    f.map(|f| f.instrumentalness),
                    f.map(|f| f.liveness),
                    f.map(|f| f.loudness),
                    f.map(|f| f.speechiness),
                    f.map(|f| f.time_signature),
                ])?;
            }
        }
        tx.commit()?;
        debug!("Stored {} of {} track cache entries", changed, entries.len());
        Ok(changed)
    }

    fn top_in_range(
        &self,
        dimension: AudioDimension,
        bucket: ValueBucket,
        limit: usize,
    ) -> Result<Vec<CachedTrack>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {columns} FROM tracks \
             WHERE has_features = 1 AND \"{dim}\" >= ?1 AND \"{dim}\" {upper} ?2 \
             ORDER BY popularity DESC, id ASC LIMIT ?3",
            columns = TRACK_COLUMNS,
            dim = dimension.as_str(),
            upper = if bucket.inclusive_max { "<=" } else { "<" },
        ))?;
        let rows = stmt
            .query_map(
                params![bucket.min, bucket.max, limit as i64],
                Self::row_to_cached_track,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("Failed to query cached tracks by {}", dimension))?;
        Ok(rows)
    }

    fn count(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM tracks", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
