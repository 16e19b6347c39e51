use url::Url;
use uuid::Uuid;

/// Convenience wrapper for URL generation functions.
#[derive(Clone)]
pub struct Urls {
    /// Top-level URL, including trailing slash.
    base: Url,

    /// Path segment under which all API routes are mounted.
    pub(crate) api_path: String,

    /// Prefix for all API routes, including trailing slash.
    api_prefix: String,
}

impl Urls {
    /// Create a new instance. `api_path` should *not* include a trailing slash.
    pub fn new(base: impl AsRef<str>, api_path: impl Into<String>) -> Self {
        let base =
            Url::parse(base.as_ref()).unwrap_or_else(|_| panic!("parse {} as URL", base.as_ref()));
        let api_path = api_path.into();
        let api_prefix = format!("{}/", api_path);

        Urls {
            base,
            api_path,
            api_prefix,
        }
    }

    pub fn reviews(&self) -> Url {
        self.base
            .join(&self.api_prefix)
            .and_then(|api| api.join("reviews/"))
            .expect("get reviews URL")
    }

    pub fn review(&self, id: &Uuid) -> Url {
        let id = format!("{}", id);
        self.reviews()
            .join(&id)
            .unwrap_or_else(|_| panic!("get URL for review {}", id))
    }
}
