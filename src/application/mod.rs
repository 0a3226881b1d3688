pub mod use_cases;

pub use use_cases::deduplication::{DeduplicationStore, InMemoryDeduplicationStore};
pub use use_cases::ingestion_observer::{
    FanoutObserver, IngestionEvent, IngestionObserver, MemoryLogObserver, TracingObserver,
};
pub use use_cases::ingestion_pipeline::IngestionPipeline;
pub use use_cases::layout_rules::LayoutRules;
pub use use_cases::summary_materializer::SummaryMaterializer;
