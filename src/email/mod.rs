pub mod common;
pub mod harvester;

// Re-export commonly used items
pub use common::{AttachmentDescriptor, HarvestReport, Mailbox, MessagePage, MessagePart};
pub use harvester::AttachmentHarvester;
