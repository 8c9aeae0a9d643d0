pub mod config;
pub mod structured_logging;

pub use structured_logging::{
    init_structured_logging,
    ExecutionContext,
    LoggingConfig,
    MigrationMetrics,
    OperationTimer,
    RunContext,
    StructuredLogEntry,
};

pub use config::{
    BatchConfigBase, BulkConfigBase, ConfigError, ConfigResult, MigrationConfig,
    RateLimitConfigBase, RetryConfigBase, SuggestionTimeoutConfig, VerificationConfig,
    ENV_PREFIX,
};
