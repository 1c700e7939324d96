/// Where confirmed messages come from.
///
/// - `postgres` - the chatbot's `messages` table
pub mod postgres;

pub use postgres::PgMessageSource;

use crate::error::FetchError;
use crate::types::Message;
use async_trait::async_trait;

#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Up to `limit` most recent messages in any order. An empty table is an
    /// empty list, not an error.
    async fn fetch_messages(&self, limit: usize) -> Result<Vec<Message>, FetchError>;
}
