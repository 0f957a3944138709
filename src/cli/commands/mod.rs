mod config;
mod export;
mod extract;
mod run;
mod status;

pub use config::ConfigCommand;
pub use export::ExportArgs;
pub use extract::ExtractArgs;
pub use run::RunArgs;
pub use status::StatusArgs;

pub use config::handle_config;
pub use export::handle_export;
pub use extract::handle_extract;
pub use run::handle_run;
pub use status::handle_status;
