//! Client core for the Hi Chat dashboard: REST access, the socket transport
//! and the view models that keep lists and detail panes in sync with it.

pub mod api;
pub mod app;
pub mod error;
pub mod lifetime;
pub mod storage;
pub mod sync;
pub mod transport;
pub mod ui;
pub mod utils;
pub mod widget;

pub use api::ApiClient;
pub use app::Settings;
pub use error::{ApiError, ApiResult, ApiResultExt};
pub use lifetime::Lifetime;
pub use storage::ConversationCache;
pub use transport::{ConnectionState, SocketClient, Transport};
