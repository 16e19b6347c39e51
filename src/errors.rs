use thiserror::Error;
use uuid::Uuid;
use warp::reject;

/// Enumerates high-level errors returned by this library.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Represents an SQL error.
    #[error("SQLx error")]
    Sqlx { source: sqlx::Error },

    /// Represents a rejected age update. Ages must be positive.
    #[error("age must be greater than 0, got {0}")]
    InvalidAge(i32),

    /// Represents a reference to an album that is not in the database.
    #[error("album {id} does not exist")]
    AlbumNotFound { id: String },

    /// Represents a reference to a review that is not in the database.
    #[error("review {id} does not exist")]
    ReviewNotFound { id: Uuid },

    /// Represents a reference to a user that is not in the database.
    #[error("no user found for subject {subject}")]
    UserNotFound { subject: String },

    /// Represents an empty result for the latest-reviews listing.
    #[error("no reviews found")]
    NoReviews,

    /// Represents a mutation attempted by someone other than the owner.
    #[error("review {id} belongs to another user")]
    PermissionDenied { id: Uuid },

    /// Represents a request to a protected route without credentials.
    #[error("missing authorization header")]
    MissingAuthorization,

    /// Represents an authorization header that is not a bearer token.
    #[error("malformed authorization header")]
    MalformedAuthorization,

    /// Represents a bearer token that failed verification.
    #[error("invalid token: {source}")]
    InvalidToken { source: jsonwebtoken::errors::Error },

    /// Represents a verified token without a subject claim.
    #[error("token is missing a subject claim")]
    MissingSubjectClaim,

    /// Represents a token signed with a key this service does not know.
    #[error("unknown signing key {kid:?}")]
    UnknownSigningKey { kid: Option<String> },

    /// Represents a JWKS document entry that could not be converted
    /// into a decoding key.
    #[error("unable to parse signing key")]
    InvalidSigningKey { source: jsonwebtoken::errors::Error },

    /// Represents a failure to download the identity provider's JWKS
    /// document.
    #[error("unable to fetch signing keys")]
    JwksFetchFailed { source: reqwest::Error },

    /// Represents a transport-level failure talking to the catalog
    /// provider.
    #[error("catalog request failed")]
    CatalogRequestFailed { source: reqwest::Error },

    /// Represents a non-success response from the catalog provider.
    #[error("catalog returned status {status}")]
    CatalogStatus { status: u16 },

    /// Represents a catalog response body that could not be decoded.
    #[error("unable to parse catalog response")]
    MalformedCatalogResponse { source: reqwest::Error },
}

impl reject::Reject for BackendError {}
