pub mod generate;
pub mod status;

pub use generate::GenerateCommand;
pub use status::StatusCommand;
