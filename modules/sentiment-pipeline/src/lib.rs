pub mod aggregate;
pub mod export;
pub mod lexicon;
pub mod normalizer;
pub mod persist;
pub mod pipeline;
pub mod report;
pub mod scorer;
pub mod source;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use aggregate::{aggregate, engagement_correlation, EngagementCorrelation};
pub use export::{export_for_chart, export_records_for_chart, ChartKind, RecordChartKind, TidyTable};
pub use lexicon::LexiconOracle;
pub use normalizer::normalize;
pub use persist::{PersistResult, PersistenceCoordinator, RecordSink, RetryPolicy, SinkError};
pub use pipeline::{Pipeline, RunOutput};
pub use report::RunReport;
pub use scorer::{OracleError, PolarityOracle, Scorer};
pub use source::{fetch_topics, PostSource, TopicBatch};
