pub mod chat;
pub mod color;
pub mod error;
pub mod events;
pub mod history;
pub mod models;
pub mod normalize;
pub mod prompts;

pub use color::ColorRecord;
pub use error::LookupError;
