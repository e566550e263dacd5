//! Campaign tools the planning model can call: semantic search, file
//! reads, dice, and conversation history.

pub mod dice;
pub mod files;
pub mod registry;
pub mod search;

pub use dice::DiceRoller;
pub use files::CampaignFileStore;
pub use registry::ToolRegistry;
pub use search::CampaignSearch;
