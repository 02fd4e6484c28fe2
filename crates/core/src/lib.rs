pub mod catalog;
pub mod config;
pub mod extract;
pub mod filter;
pub mod metrics;
pub mod net;
pub mod searcher;
pub mod session;
pub mod testing;

pub use catalog::{CatalogEntry, CatalogError, SourceCatalog, SourceDefinition, SourceSummary};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
    SearchConfig,
};
pub use filter::{Filter, FilterConfig, KeywordFilter, Verdict};
pub use net::{ClientFactory, HttpClientFactory, NetworkClient, NetworkError};
pub use searcher::{
    ContentKind, NormalizedRecord, ProgressReporter, SearchCoordinator, SearchError,
    SearchOutcome, SearchRequest,
};
pub use session::{MemorySessionStore, SessionStore, SqliteSessionStore};
