use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use futures::future::BoxFuture;
use futures::FutureExt;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::album::{Album, NewAlbum};
use crate::db::Db;
use crate::errors::BackendError;
use crate::review::{NewReview, Review, ReviewUpdate};
use crate::user::{NewUser, ProfileUpdate, User, UserProfile};

/// An in-memory `Db` for unit tests, honoring the same uniqueness and
/// ownership semantics as the Postgres implementation.
#[derive(Default)]
pub(crate) struct MockDb {
    users: RwLock<Vec<User>>,
    albums: RwLock<Vec<Album>>,
    reviews: RwLock<Vec<Review>>,
    failing_albums: RwLock<HashSet<String>>,
    clock: AtomicI64,
}

impl MockDb {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Makes `insert_album` fail for the given external ID.
    pub(crate) fn fail_album(&self, id: &str) {
        self.failing_albums.write().unwrap().insert(id.to_owned());
    }

    pub(crate) fn album_count(&self) -> usize {
        self.albums.read().unwrap().len()
    }

    pub(crate) fn user_count(&self) -> usize {
        self.users.read().unwrap().len()
    }

    /// A strictly increasing timestamp, so creation order is
    /// unambiguous within a test.
    fn next_timestamp(&self) -> OffsetDateTime {
        let tick = self.clock.fetch_add(1, Ordering::SeqCst);

        OffsetDateTime::from_unix_timestamp(1_600_000_000 + tick)
    }

    fn synthetic_error() -> BackendError {
        BackendError::Sqlx {
            source: sqlx::Error::RowNotFound,
        }
    }
}

impl Db for MockDb {
    fn insert_album(&self, album: &NewAlbum) -> BoxFuture<Result<bool, BackendError>> {
        let album = album.clone();

        async move {
            if self.failing_albums.read().unwrap().contains(&album.id) {
                return Err(Self::synthetic_error());
            }

            let mut albums = self.albums.write().unwrap();

            if albums.iter().any(|a| a.id == album.id || a.title == album.title) {
                return Ok(false);
            }

            albums.push(Album {
                id: album.id,
                title: album.title,
                artist: album.artist,
                released_on: album.released_on,
                total_tracks: album.total_tracks,
            });

            Ok(true)
        }
        .boxed()
    }

    fn reviewed_albums(&self, subject: &str) -> BoxFuture<Result<Vec<Album>, BackendError>> {
        let subject = subject.to_owned();

        async move {
            let user_id = match self.users.read().unwrap().iter().find(|u| u.subject == subject) {
                Some(user) => user.id,
                None => return Ok(vec![]),
            };

            let album_ids: HashSet<String> = self
                .reviews
                .read()
                .unwrap()
                .iter()
                .filter(|r| r.user_id == user_id)
                .map(|r| r.album_id.clone())
                .collect();

            Ok(self
                .albums
                .read()
                .unwrap()
                .iter()
                .filter(|a| album_ids.contains(&a.id))
                .cloned()
                .collect())
        }
        .boxed()
    }

    fn lookup_user(&self, subject: &str) -> BoxFuture<Result<Option<User>, BackendError>> {
        let subject = subject.to_owned();

        async move {
            Ok(self
                .users
                .read()
                .unwrap()
                .iter()
                .find(|u| u.subject == subject)
                .cloned())
        }
        .boxed()
    }

    fn create_user(&self, user: &NewUser) -> BoxFuture<Result<User, BackendError>> {
        let user = user.clone();

        async move {
            let mut users = self.users.write().unwrap();

            // the existing row wins, as with ON CONFLICT DO NOTHING
            if let Some(existing) = users.iter().find(|u| u.subject == user.subject) {
                return Ok(existing.clone());
            }

            let created = User {
                id: Uuid::new_v4(),
                subject: user.subject,
                email: user.email,
                name: user.name,
                age: None,
                created_at: self.next_timestamp(),
            };
            users.push(created.clone());

            Ok(created)
        }
        .boxed()
    }

    fn retrieve_profile(
        &self,
        subject: &str,
    ) -> BoxFuture<Result<Option<UserProfile>, BackendError>> {
        let subject = subject.to_owned();

        async move {
            Ok(self
                .users
                .read()
                .unwrap()
                .iter()
                .find(|u| u.subject == subject)
                .map(|u| UserProfile {
                    email: u.email.clone(),
                    name: u.name.clone(),
                    age: u.age,
                    created_at: u.created_at,
                }))
        }
        .boxed()
    }

    fn update_profile(
        &self,
        subject: &str,
        update: &ProfileUpdate,
    ) -> BoxFuture<Result<Option<User>, BackendError>> {
        let subject = subject.to_owned();
        let update = update.clone();

        async move {
            if let Some(age) = update.age {
                if age <= 0 {
                    return Err(BackendError::InvalidAge(age));
                }
            }

            let mut users = self.users.write().unwrap();

            Ok(users.iter_mut().find(|u| u.subject == subject).map(|user| {
                if let Some(name) = update.name {
                    user.name = Some(name);
                }
                if let Some(age) = update.age {
                    user.age = Some(age);
                }

                user.clone()
            }))
        }
        .boxed()
    }

    fn insert_review(
        &self,
        subject: &str,
        review: &NewReview,
    ) -> BoxFuture<Result<Review, BackendError>> {
        let subject = subject.to_owned();
        let review = review.clone();

        async move {
            let user_id = self
                .users
                .read()
                .unwrap()
                .iter()
                .find(|u| u.subject == subject)
                .map(|u| u.id)
                .ok_or(BackendError::UserNotFound {
                    subject: subject.clone(),
                })?;

            if !self.albums.read().unwrap().iter().any(|a| a.id == review.album_id) {
                return Err(BackendError::AlbumNotFound {
                    id: review.album_id,
                });
            }

            let created = Review {
                id: Uuid::new_v4(),
                title: review.title,
                content: review.content,
                user_id,
                album_id: review.album_id,
                created_at: self.next_timestamp(),
            };
            self.reviews.write().unwrap().push(created.clone());

            Ok(created)
        }
        .boxed()
    }

    fn retrieve_review(&self, id: &Uuid) -> BoxFuture<Result<Option<Review>, BackendError>> {
        let id = *id;

        async move {
            Ok(self
                .reviews
                .read()
                .unwrap()
                .iter()
                .find(|r| r.id == id)
                .cloned())
        }
        .boxed()
    }

    fn reviews_by_user(&self, subject: &str) -> BoxFuture<Result<Vec<Review>, BackendError>> {
        let subject = subject.to_owned();

        async move {
            let user_id = match self.users.read().unwrap().iter().find(|u| u.subject == subject) {
                Some(user) => user.id,
                None => return Ok(vec![]),
            };

            Ok(self
                .reviews
                .read()
                .unwrap()
                .iter()
                .filter(|r| r.user_id == user_id)
                .cloned()
                .collect())
        }
        .boxed()
    }

    fn reviews_by_album(&self, album_id: &str) -> BoxFuture<Result<Vec<Review>, BackendError>> {
        let album_id = album_id.to_owned();

        async move {
            Ok(self
                .reviews
                .read()
                .unwrap()
                .iter()
                .filter(|r| r.album_id == album_id)
                .cloned()
                .collect())
        }
        .boxed()
    }

    fn latest_reviews(&self, count: i16) -> BoxFuture<Result<Vec<Review>, BackendError>> {
        async move {
            let mut reviews: Vec<Review> = self.reviews.read().unwrap().clone();
            reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            reviews.truncate(count as usize);

            Ok(reviews)
        }
        .boxed()
    }

    fn update_review(
        &self,
        id: &Uuid,
        update: &ReviewUpdate,
    ) -> BoxFuture<Result<Review, BackendError>> {
        let id = *id;
        let update = update.clone();

        async move {
            let mut reviews = self.reviews.write().unwrap();

            let review = reviews
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or(BackendError::ReviewNotFound { id })?;

            if let Some(title) = update.title {
                review.title = title;
            }
            if let Some(content) = update.content {
                review.content = content;
            }

            Ok(review.clone())
        }
        .boxed()
    }

    fn delete_review(&self, id: &Uuid) -> BoxFuture<Result<(), BackendError>> {
        let id = *id;

        async move {
            let mut reviews = self.reviews.write().unwrap();
            let before = reviews.len();
            reviews.retain(|r| r.id != id);

            if reviews.len() == before {
                Err(BackendError::ReviewNotFound { id })
            } else {
                Ok(())
            }
        }
        .boxed()
    }
}
