use anyhow::{Context, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use google_gmail1::api::{ModifyMessageRequest, Scope};
use google_gmail1::{oauth2, Gmail};
use log::{debug, info};

use crate::config::GmailConfig;
use crate::email::{Mailbox, MessagePage, MessagePart};

const USER_ID: &str = "me";
const UNREAD_LABEL: &str = "UNREAD";

type Connector = hyper_rustls::HttpsConnector<hyper::client::HttpConnector>;

pub struct GmailClient {
    hub: Gmail<Connector>,
}

impl GmailClient {
    /// Authenticate with the cached token, refreshing it or running the
    /// installed-app consent flow when needed. The token cache is rewritten
    /// whenever a new token is obtained.
    pub async fn new(config: &GmailConfig) -> Result<Self> {
        info!("Connecting to Gmail API via OAuth2");

        // Read OAuth2 client credentials from file
        let secret = oauth2::read_application_secret(&config.credentials_path)
            .await
            .with_context(|| {
                format!("Unable to read OAuth2 client credentials file {}", config.credentials_path)
            })?;

        // Create authenticator; the token cache is reused and refreshed across runs
        let auth = oauth2::InstalledFlowAuthenticator::builder(
            secret,
            oauth2::InstalledFlowReturnMethod::HTTPRedirect,
        )
        .persist_tokens_to_disk(&config.token_cache_path)
        .build()
        .await
        .context("Unable to create OAuth2 authenticator")?;

        // Fail here rather than halfway through a search
        auth.token(&[Scope::Modify.as_ref()])
            .await
            .context("Unable to obtain a Gmail access token")?;
        debug!("Access token available, cache at {}", config.token_cache_path);

        // Create HTTP client
        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .https_or_http()
            .enable_http1()
            .build();

        let client = hyper::Client::builder().build(connector);
        // Create Gmail hub
        let hub = Gmail::new(client, auth);

        info!("✅ Gmail API connection established successfully");

        Ok(GmailClient { hub })
    }

    pub async fn search_page(&self, query: &str, page_token: Option<&str>) -> Result<MessagePage> {
        debug!("Search criteria: {} (page token: {:?})", query, page_token);

        let mut call = self.hub
            .users()
            .messages_list(USER_ID)
            .q(query)
            .add_scope(Scope::Modify);
        if let Some(token) = page_token {
            call = call.page_token(token);
        }

        // Only IDs are listed here, content is fetched per message
        let (_, result) = call.doit().await.context("Error searching for emails")?;

        Ok(MessagePage {
            message_ids: result
                .messages
                .unwrap_or_default()
                .into_iter()
                .filter_map(|msg| msg.id)
                .collect(),
            next_page_token: result.next_page_token.filter(|token| !token.is_empty()),
        })
    }

    pub async fn fetch_message_parts(&self, message_id: &str) -> Result<Vec<MessagePart>> {
        debug!("Full email retrieval for ID: {}", message_id);

        let (_, message) = self.hub
            .users()
            .messages_get(USER_ID, message_id)
            .format("full")
            .add_scope(Scope::Modify)
            .doit()
            .await
            .context("Unable to retrieve email")?;

        Ok(message
            .payload
            .and_then(|payload| payload.parts)
            .unwrap_or_default()
            .into_iter()
            .map(convert_part)
            .collect())
    }

    /// Gmail returns attachment data base64url-encoded; the API layer hands
    /// it back already decoded.
    pub async fn fetch_attachment_data(&self, message_id: &str, attachment_id: &str) -> Result<Option<Vec<u8>>> {
        debug!("Downloading attachment {} of email {}", attachment_id, message_id);

        let (_, body) = self.hub
            .users()
            .messages_attachments_get(USER_ID, message_id, attachment_id)
            .add_scope(Scope::Modify)
            .doit()
            .await
            .context("Unable to download attachment")?;

        Ok(body.data)
    }

    pub async fn mark_as_read(&self, message_id: &str) -> Result<()> {
        info!("Marking email {} as read", message_id);

        // Create modification request
        let modify_request = ModifyMessageRequest {
            remove_label_ids: Some(vec![UNREAD_LABEL.to_string()]),
            ..ModifyMessageRequest::default()
        };

        self.hub
            .users()
            .messages_modify(modify_request, USER_ID, message_id)
            .add_scope(Scope::Modify)
            .doit()
            .await
            .context("Unable to modify email labels")?;

        Ok(())
    }
}

fn convert_part(part: google_gmail1::api::MessagePart) -> MessagePart {
    MessagePart {
        filename: part.filename.filter(|name| !name.is_empty()),
        attachment_id: part.body.and_then(|body| body.attachment_id),
        parts: part
            .parts
            .unwrap_or_default()
            .into_iter()
            .map(convert_part)
            .collect(),
    }
}

impl Mailbox for GmailClient {
    fn list_messages<'a>(
        &'a self,
        query: &'a str,
        page_token: Option<&'a str>,
    ) -> BoxFuture<'a, Result<MessagePage>> {
        self.search_page(query, page_token).boxed()
    }

    fn fetch_parts<'a>(&'a self, message_id: &'a str) -> BoxFuture<'a, Result<Vec<MessagePart>>> {
        self.fetch_message_parts(message_id).boxed()
    }

    fn fetch_attachment<'a>(
        &'a self,
        message_id: &'a str,
        attachment_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<Vec<u8>>>> {
        self.fetch_attachment_data(message_id, attachment_id).boxed()
    }

    fn mark_read<'a>(&'a self, message_id: &'a str) -> BoxFuture<'a, Result<()>> {
        self.mark_as_read(message_id).boxed()
    }
}
