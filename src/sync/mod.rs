pub mod collection;
pub mod detail;
pub mod filter;

pub use collection::SyncedCollection;
pub use detail::{Detail, DetailView, Ticket};
pub use filter::{BulkMessageFilter, CallFilter, ConversationFilter, DateRange, MeetingFilter, ReviewFilter};
