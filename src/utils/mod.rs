//! Utility functions: pixel primitives and logging setup.

pub mod image;

pub use self::image::{apply_mask, crop, image_size, load_image, rescale};

/// Initializes tracing with an environment filter for logging.
///
/// Reads the `RUST_LOG` environment variable to configure log levels. The
/// library itself never installs a subscriber; call this from binaries or
/// tests that want log output.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();
}
