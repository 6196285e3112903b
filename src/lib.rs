//! RAWG Harvest Library
//!
//! Resumable, checkpointed harvesting of the RAWG games catalog into
//! normalized `GameDto` records. Used by the `harvest` and `import_games`
//! binaries and by the integration tests.

pub mod checkpoint;
pub mod harvest;
pub mod importer;
pub mod models;
pub mod scrapers;
pub mod transform;

pub use checkpoint::CheckpointStore;
pub use harvest::{HarvestOutcome, HarvestReport, Harvester};
pub use models::{GameDto, HarvestConfig, RawgPage};
pub use scrapers::{CatalogSource, FetchError, RawgRestClient};
pub use transform::to_dto;
