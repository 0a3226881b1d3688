pub mod aggregation;
pub mod column_mapper;
pub mod deduplication;
pub mod field_extractors;
pub mod format_detector;
pub mod ingestion_observer;
pub mod ingestion_pipeline;
pub mod layout_rules;
pub mod record_normalizer;
pub mod summary_materializer;
