pub mod application;
pub mod domain;
pub mod infrastructure;

mod app;

pub use app::run;
pub use application::IngestionPipeline;
pub use domain::error::{AppError, Result};
pub use domain::outcome::RunOutcome;
pub use domain::settings::Settings;
