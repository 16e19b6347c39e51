use std::sync::Mutex;

use slog::Drain;
use slog::Fuse;
use slog_async::Async;
use slog_json::Json;

pub use slog::{debug, error, info, o, trace, warn, Discard, Logger};

/// Creates the root logger: a JSON drain writing to stderr behind an
/// async channel. With the `env_logging` feature the drain is filtered
/// through `RUST_LOG` first.
pub fn initialize_logger() -> slog::Logger {
    let drain = Mutex::new(Json::default(std::io::stderr())).map(Fuse);

    #[cfg(feature = "env_logging")]
    let drain = slog_envlogger::new(drain);

    let drain = Async::new(drain).build().fuse();

    Logger::root(
        drain,
        o!("service" => info::NAME, "version" => info::VERSION, "revision" => info::REVISION, "build_timestamp" => info::BUILD_TIMESTAMP),
    )
}
