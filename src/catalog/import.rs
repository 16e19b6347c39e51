use std::sync::Arc;

use log::{error, trace, Logger};

use crate::album::NewAlbum;
use crate::catalog::CatalogAlbum;
use crate::db::Db;

/// Persists a batch of fetched catalog records, attributing every album
/// to the configured artist. Entries whose external ID or title is
/// already present are skipped, and a failure on one record does not
/// abort the rest of the batch. Returns the number of rows inserted.
pub async fn import_albums(
    logger: &Logger,
    db: &Arc<dyn Db + Send + Sync>,
    artist: &str,
    albums: &[CatalogAlbum],
) -> usize {
    let mut imported = 0;

    for album in albums {
        let new_album = NewAlbum::from_catalog(album, artist);

        match db.insert_album(&new_album).await {
            Ok(true) => {
                trace!(logger, "Imported album"; "id" => &new_album.id, "title" => &new_album.title);
                imported += 1;
            }
            Ok(false) => {
                trace!(logger, "Skipping already-imported album"; "id" => &new_album.id, "title" => &new_album.title);
            }
            Err(e) => {
                error!(logger, "Failed to import album: {}", e; "id" => &new_album.id);
            }
        }
    }

    imported
}
