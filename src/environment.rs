use std::sync::Arc;

use log::Logger;

use crate::auth::Verifier;
use crate::catalog::Catalog;
use crate::db::Db;
use crate::urls::Urls;

/// The explicitly constructed handles every handler works with. Built
/// once at startup and cloned into each route.
#[derive(Clone)]
pub struct Environment {
    pub logger: Arc<Logger>,
    pub db: Arc<dyn Db + Send + Sync>,
    pub catalog: Arc<dyn Catalog>,
    pub verifier: Arc<dyn Verifier>,
    pub urls: Arc<Urls>,
    pub config: Config,
}

impl Environment {
    pub fn new(
        logger: Arc<Logger>,
        db: Arc<dyn Db + Send + Sync>,
        catalog: Arc<dyn Catalog>,
        verifier: Arc<dyn Verifier>,
        urls: Arc<Urls>,
        config: Config,
    ) -> Self {
        Self {
            logger,
            db,
            catalog,
            verifier,
            urls,
            config,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Config {
    pub(crate) latest_reviews: u8,
}

impl Config {
    pub fn new(latest_reviews: u8) -> Self {
        Self { latest_reviews }
    }
}
