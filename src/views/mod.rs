pub mod chat;
pub mod composer;

pub use chat::ChatView;
pub use composer::Composer;
