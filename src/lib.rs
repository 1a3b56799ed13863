pub mod config;
pub mod pipeline;

pub use pipeline::analysis::{analyze_view, FindingsMap};
pub use pipeline::annotation::{AnnotatedUpload, ImageStore, PosturePipeline};
pub use pipeline::landmarks::{provider_from_config, ViewType};
pub use pipeline::narrative::{NarrativeOrchestrator, ProviderSet};
pub use pipeline::PostureError;

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. `RUST_LOG` wins over the default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .init();
}
