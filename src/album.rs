use serde::{Deserialize, Serialize};

use crate::catalog::CatalogAlbum;
use crate::normalization;

/// A single album in the database.
#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    /// The external catalog identifier.
    pub id: String,

    /// The album title. Must be unique after normalization.
    pub title: String,

    /// The artist this album is attributed to.
    pub artist: String,

    /// The release date as reported by the catalog. The catalog emits
    /// variable-precision strings ("2006", "2006-10-24"), so it is
    /// stored verbatim.
    #[serde(rename = "releaseDate")]
    pub released_on: String,

    /// The number of tracks on the album.
    pub total_tracks: i32,
}

/// An album in the database before it's imported.
#[derive(Clone, Debug)]
pub struct NewAlbum {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub released_on: String,
    pub total_tracks: i32,
}

impl NewAlbum {
    /// Converts a fetched catalog record into an insertable row,
    /// attributed to the configured artist.
    pub fn from_catalog(album: &CatalogAlbum, artist: &str) -> Self {
        Self {
            id: album.id.clone(),
            title: normalization::normalize(&album.name),
            artist: artist.to_owned(),
            released_on: album.release_date.clone(),
            total_tracks: album.total_tracks,
        }
    }
}
