pub mod account;
pub mod anthropic;
pub mod chat;
pub mod requests;
pub mod transaction;

pub use account::*;
pub use anthropic::*;
pub use chat::*;
pub use requests::*;
pub use transaction::*;
