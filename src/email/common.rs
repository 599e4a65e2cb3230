//! Common structures for mailbox access

use anyhow::Result;
use futures::future::BoxFuture;

/// One page of a message search
#[derive(Debug, Clone, Default)]
pub struct MessagePage {
    pub message_ids: Vec<String>,
    pub next_page_token: Option<String>,
}

/// Content part of a fetched message, possibly nested
#[derive(Debug, Clone, Default)]
pub struct MessagePart {
    pub filename: Option<String>,
    pub attachment_id: Option<String>,
    pub parts: Vec<MessagePart>,
}

/// A CSV attachment found while scanning a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentDescriptor {
    pub filename: String,
    pub message_id: String,
    pub attachment_id: String,
}

/// Outcome of one harvester pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HarvestReport {
    pub messages_found: usize,
    pub attachments_written: usize,
    pub messages_marked_read: usize,
}

/// Operations the harvester needs from the email provider.
pub trait Mailbox: Send + Sync {
    /// Fetch one page of message IDs matching `query`
    fn list_messages<'a>(
        &'a self,
        query: &'a str,
        page_token: Option<&'a str>,
    ) -> BoxFuture<'a, Result<MessagePage>>;

    /// Fetch the top-level content parts of a message
    fn fetch_parts<'a>(&'a self, message_id: &'a str) -> BoxFuture<'a, Result<Vec<MessagePart>>>;

    /// Fetch decoded attachment bytes; `None` when the provider returns no data
    fn fetch_attachment<'a>(
        &'a self,
        message_id: &'a str,
        attachment_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<Vec<u8>>>>;

    /// Remove the UNREAD label
    fn mark_read<'a>(&'a self, message_id: &'a str) -> BoxFuture<'a, Result<()>>;
}

/// Collect every part, at any depth, whose filename contains "csv".
pub fn csv_attachments(message_id: &str, parts: &[MessagePart]) -> Vec<AttachmentDescriptor> {
    let mut found = Vec::new();
    collect_csv_parts(message_id, parts, &mut found);
    found
}

fn collect_csv_parts(message_id: &str, parts: &[MessagePart], found: &mut Vec<AttachmentDescriptor>) {
    for part in parts {
        if let (Some(filename), Some(attachment_id)) = (&part.filename, &part.attachment_id) {
            if filename.to_lowercase().contains("csv") {
                found.push(AttachmentDescriptor {
                    filename: filename.clone(),
                    message_id: message_id.to_string(),
                    attachment_id: attachment_id.clone(),
                });
            }
        }
        collect_csv_parts(message_id, &part.parts, found);
    }
}
