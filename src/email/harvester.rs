use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::common::{csv_attachments, AttachmentDescriptor, HarvestReport, Mailbox};

/// Downloads CSV attachments of unread matching messages, then marks them read.
pub struct AttachmentHarvester<'m, M: Mailbox> {
    mailbox: &'m M,
    output_dir: PathBuf,
    dry_run: bool,
}

impl<'m, M: Mailbox> AttachmentHarvester<'m, M> {
    pub fn new(mailbox: &'m M, output_dir: impl Into<PathBuf>) -> Self {
        AttachmentHarvester {
            mailbox,
            output_dir: output_dir.into(),
            dry_run: false,
        }
    }

    /// Download without marking anything read
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub async fn harvest(&self, query: &str) -> Result<HarvestReport> {
        info!("Searching for messages: {}", query);

        // Collect every page before touching any message
        let message_ids = self.search_all(query).await?;
        let mut report = HarvestReport {
            messages_found: message_ids.len(),
            ..HarvestReport::default()
        };

        if message_ids.is_empty() {
            info!("No messages found matching the query");
            return Ok(report);
        }

        // Create output directory if it doesn't exist
        fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("Unable to create output directory {}", self.output_dir.display())
        })?;

        for message_id in &message_ids {
            let written = self.harvest_message(message_id).await?;
            report.attachments_written += written;

            if self.dry_run {
                debug!("Dry-run: message {} left unread", message_id);
                continue;
            }

            // All attachments are on disk, the message can be marked read
            self.mailbox
                .mark_read(message_id)
                .await
                .with_context(|| format!("Unable to mark message {} as read", message_id))?;
            report.messages_marked_read += 1;
            debug!("Message {} marked as read", message_id);
        }

        info!(
            "Harvest completed: {} message(s), {} attachment(s) written, {} marked read",
            report.messages_found, report.attachments_written, report.messages_marked_read
        );

        Ok(report)
    }

    /// Follow continuation tokens until the full candidate set is known.
    async fn search_all(&self, query: &str) -> Result<Vec<String>> {
        let mut message_ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .mailbox
                .list_messages(query, page_token.as_deref())
                .await
                .context("Error searching for messages")?;

            debug!("Search page returned {} message(s)", page.message_ids.len());
            message_ids.extend(page.message_ids);

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        info!("Found {} matching message(s)", message_ids.len());
        Ok(message_ids)
    }

    /// Write every CSV attachment of one message. Any failure aborts before
    /// the message can be marked read.
    async fn harvest_message(&self, message_id: &str) -> Result<usize> {
        let parts = self
            .mailbox
            .fetch_parts(message_id)
            .await
            .with_context(|| format!("Unable to fetch message {}", message_id))?;

        let descriptors = csv_attachments(message_id, &parts);
        if descriptors.is_empty() {
            warn!("No CSV attachment in message {}", message_id);
            return Ok(0);
        }

        let mut written = 0;
        for descriptor in &descriptors {
            if self.download(descriptor).await?.is_some() {
                written += 1;
            }
        }

        Ok(written)
    }

    async fn download(&self, descriptor: &AttachmentDescriptor) -> Result<Option<PathBuf>> {
        let data = self
            .mailbox
            .fetch_attachment(&descriptor.message_id, &descriptor.attachment_id)
            .await
            .with_context(|| {
                format!(
                    "Unable to fetch attachment '{}' of message {}",
                    descriptor.filename, descriptor.message_id
                )
            })?;

        let Some(data) = data else {
            warn!("Attachment '{}' has no data, skipped", descriptor.filename);
            return Ok(None);
        };

        let path = write_attachment(&self.output_dir, &descriptor.filename, &data)?;
        info!("💾 Saved '{}' ({} bytes) to {}", descriptor.filename, data.len(), path.display());
        Ok(Some(path))
    }
}

/// Write attachment text to `<dir>/<file name>` and sync it to disk.
pub fn write_attachment(dir: &Path, filename: &str, data: &[u8]) -> Result<PathBuf> {
    let name = Path::new(filename)
        .file_name()
        .with_context(|| format!("Invalid attachment filename '{}'", filename))?;
    let path = dir.join(name);

    // Attachments are written as text
    let text = std::str::from_utf8(data)
        .with_context(|| format!("Attachment '{}' is not valid UTF-8 text", filename))?;

    let mut file = File::create(&path)
        .with_context(|| format!("Unable to create {}", path.display()))?;
    file.write_all(text.as_bytes())
        .with_context(|| format!("Unable to write {}", path.display()))?;
    file.sync_all()
        .with_context(|| format!("Unable to sync {}", path.display()))?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_attachment_strips_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_attachment(dir.path(), "../../etc/Interval.csv", b"a,b\n1,2\n").unwrap();

        assert_eq!(path, dir.path().join("Interval.csv"));
        assert_eq!(fs::read_to_string(path).unwrap(), "a,b\n1,2\n");
    }

    #[test]
    fn test_write_attachment_rejects_binary() {
        let dir = tempfile::tempdir().unwrap();
        assert!(write_attachment(dir.path(), "data.csv", &[0xff, 0xfe, 0x00]).is_err());
        assert!(!dir.path().join("data.csv").exists());
    }
}
