pub mod backfill_commands;
pub mod ingest_commands;
