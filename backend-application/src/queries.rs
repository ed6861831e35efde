pub mod pipeline_queries;
