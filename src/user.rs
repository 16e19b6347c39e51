use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::Claims;
use crate::errors::BackendError;
use crate::normalization;
use crate::timestamps;

/// A single user in the database.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct User {
    /// The ID of the user.
    pub id: Uuid,

    /// The identity provider's stable subject key for this user.
    #[serde(rename = "auth0Id")]
    pub subject: String,

    /// The email claim supplied at first sign-in, if any.
    pub email: Option<String>,

    /// The display name.
    pub name: Option<String>,

    /// The age, if the user chose to share it. Always positive.
    pub age: Option<i32>,

    /// The date and time the user first signed in.
    #[serde(rename = "signUpDate", with = "timestamps")]
    pub created_at: OffsetDateTime,
}

/// A user in the database before their first sign-in, built from
/// verified token claims.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub subject: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

impl NewUser {
    pub fn from_claims(claims: &Claims) -> Self {
        Self {
            subject: claims.subject.clone(),
            email: claims.email.clone(),
            name: claims.name.clone(),
        }
    }
}

/// The projection of a user returned by the profile endpoint.
#[derive(Clone, Debug, Serialize)]
pub struct UserProfile {
    pub email: Option<String>,

    pub name: Option<String>,

    pub age: Option<i32>,

    #[serde(rename = "signUpDate", with = "timestamps")]
    pub created_at: OffsetDateTime,
}

/// The mutable profile fields accepted by the update endpoint.
#[derive(Clone, Debug, Deserialize)]
pub struct ProfileUpdate {
    /// The new display name, if supplied.
    #[serde(default)]
    #[serde(deserialize_with = "normalization::deserialize_option")]
    pub name: Option<String>,

    /// The new age, if supplied. Must be positive.
    #[serde(default)]
    pub age: Option<i32>,
}

impl ProfileUpdate {
    /// Rejects out-of-range fields before anything is written.
    pub fn validate(&self) -> Result<(), BackendError> {
        match self.age {
            Some(age) if age <= 0 => Err(BackendError::InvalidAge(age)),
            _ => Ok(()),
        }
    }
}
