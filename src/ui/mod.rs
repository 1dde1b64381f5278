pub mod campaigns;
pub mod inbox;
pub mod layout;

pub use campaigns::{CampaignBoard, CampaignController};
pub use inbox::{Inbox, InboxBinding, InboxController};
pub use layout::{PaneLayout, Selection, Viewport};
