use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::get_variable;
use crate::errors::BackendError;

pub mod import;

/// How long to wait on any single catalog request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How many albums to ask the catalog for in one search.
const SEARCH_LIMIT: u8 = 30;

/// A single album as returned by the catalog provider's search.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CatalogAlbum {
    /// The provider's identifier for the album.
    pub id: String,

    /// The album name.
    pub name: String,

    /// The release date, at whatever precision the provider knows it.
    pub release_date: String,

    /// The number of tracks on the album.
    pub total_tracks: i32,
}

/// The detail record for a single album.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CatalogAlbumDetail {
    pub id: String,

    pub name: String,

    pub release_date: String,

    pub total_tracks: i32,

    /// The track listing page.
    pub tracks: CatalogTracks,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CatalogTracks {
    pub items: Vec<CatalogTrack>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CatalogTrack {
    pub name: String,

    pub track_number: i32,

    pub duration_ms: i64,
}

/// Read-only access to the external music catalog.
pub trait Catalog: Send + Sync {
    /// The artist whose discography this deployment serves.
    fn artist(&self) -> &str;

    /// Searches the catalog for the configured artist's albums.
    fn artist_albums(&self) -> BoxFuture<Result<Vec<CatalogAlbum>, BackendError>>;

    /// Fetches the detail record for a single album.
    fn album(&self, id: &str) -> BoxFuture<Result<CatalogAlbumDetail, BackendError>>;
}

/// A catalog backed by a Spotify-style web API: a client-credentials
/// token exchange against the accounts service, then bearer-equipped
/// lookups against the API proper.
pub struct SpotifyCatalog {
    client: reqwest::Client,
    accounts_url: Url,
    api_url: Url,
    client_id: String,
    client_secret: String,
    artist: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    albums: AlbumPage,
}

#[derive(Debug, Deserialize)]
struct AlbumPage {
    items: Vec<CatalogAlbum>,
}

impl SpotifyCatalog {
    pub fn new(
        accounts_url: Url,
        api_url: Url,
        client_id: String,
        client_secret: String,
        artist: String,
    ) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|source| BackendError::CatalogRequestFailed { source })?;

        Ok(Self {
            client,
            accounts_url,
            api_url,
            client_id,
            client_secret,
            artist,
        })
    }

    pub fn from_env() -> Result<Self, BackendError> {
        let accounts_url = get_variable("BACKEND_CATALOG_ACCOUNTS_URL");
        let accounts_url = Url::parse(&accounts_url)
            .unwrap_or_else(|_| panic!("parse {} as URL", accounts_url));
        let api_url = get_variable("BACKEND_CATALOG_API_URL");
        let api_url = Url::parse(&api_url).unwrap_or_else(|_| panic!("parse {} as URL", api_url));

        Self::new(
            accounts_url,
            api_url,
            get_variable("BACKEND_CATALOG_CLIENT_ID"),
            get_variable("BACKEND_CATALOG_CLIENT_SECRET"),
            get_variable("BACKEND_ARTIST_NAME"),
        )
    }

    /// Exchanges the configured client credentials for a short-lived
    /// access token. The catalog invalidates these quickly, so one is
    /// fetched per request rather than cached.
    async fn access_token(&self) -> Result<String, BackendError> {
        let url = self
            .accounts_url
            .join("api/token")
            .expect("join accounts URL with token path");

        let response = self
            .client
            .post(url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|source| BackendError::CatalogRequestFailed { source })?;

        let token: TokenResponse = check_status(response)?
            .json()
            .await
            .map_err(|source| BackendError::MalformedCatalogResponse { source })?;

        Ok(token.access_token)
    }
}

impl Catalog for SpotifyCatalog {
    fn artist(&self) -> &str {
        &self.artist
    }

    fn artist_albums(&self) -> BoxFuture<Result<Vec<CatalogAlbum>, BackendError>> {
        async move {
            let token = self.access_token().await?;

            let mut url = self
                .api_url
                .join("v1/search")
                .expect("join API URL with search path");
            url.query_pairs_mut()
                .append_pair("q", &self.artist)
                .append_pair("type", "album")
                .append_pair("limit", &SEARCH_LIMIT.to_string());

            let response = self
                .client
                .get(url)
                .bearer_auth(&token)
                .send()
                .await
                .map_err(|source| BackendError::CatalogRequestFailed { source })?;

            let results: SearchResponse = check_status(response)?
                .json()
                .await
                .map_err(|source| BackendError::MalformedCatalogResponse { source })?;

            Ok(results.albums.items)
        }
        .boxed()
    }

    fn album(&self, id: &str) -> BoxFuture<Result<CatalogAlbumDetail, BackendError>> {
        let id = id.to_owned();

        async move {
            let token = self.access_token().await?;

            let url = self
                .api_url
                .join(&format!("v1/albums/{}", id))
                .expect("join API URL with album path");

            let response = self
                .client
                .get(url)
                .bearer_auth(&token)
                .send()
                .await
                .map_err(|source| BackendError::CatalogRequestFailed { source })?;

            let detail: CatalogAlbumDetail = check_status(response)?
                .json()
                .await
                .map_err(|source| BackendError::MalformedCatalogResponse { source })?;

            Ok(detail)
        }
        .boxed()
    }
}

fn check_status(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = response.status();

    if status.is_success() {
        Ok(response)
    } else {
        Err(BackendError::CatalogStatus {
            status: status.as_u16(),
        })
    }
}
