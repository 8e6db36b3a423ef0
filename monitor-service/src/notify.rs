//! Notification delivery.

use std::sync::Arc;

use anyhow::Context;
use threema_gateway::{ApiBuilder, E2eApi, RecipientKey};
use tokio::runtime::{self, Runtime};
use tracing::{debug, error, info};

use crate::config::Threema;

/// Fire-and-forget delivery of a human readable message.
pub trait Notifier {
    fn notify(&self, message: &str);
}

impl<N: Notifier + ?Sized> Notifier for Box<N> {
    fn notify(&self, message: &str) {
        (**self).notify(message)
    }
}

/// Only writes notifications to the log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        info!("Notification: {}", message);
    }
}

/// Sends end-to-end encrypted Threema messages to all recipients.
///
/// Messages are sent on a background runtime, so `notify` returns
/// immediately. Delivery failures are logged and dropped.
pub struct ThreemaNotifier {
    runtime: Runtime,
    api: Arc<E2eApi>,
    recipients: Vec<String>,
}

impl ThreemaNotifier {
    pub fn new(config: Threema) -> anyhow::Result<Self> {
        let api = ApiBuilder::new(config.gateway_id, config.gateway_secret)
            .with_private_key(config.private_key)
            .into_e2e()
            .context("Failed to set up Threema gateway API")?;
        let runtime = runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("threema")
            .enable_all()
            .build()
            .context("Failed to start notification runtime")?;
        Ok(Self {
            runtime,
            api: Arc::new(api),
            recipients: config.recipients,
        })
    }
}

async fn send_message(api: &E2eApi, recipient: &str, text: &str) -> anyhow::Result<String> {
    // Fetch public key
    let public_key = api
        .lookup_pubkey(recipient)
        .await
        .context("Could not fetch public key")?;
    let recipient_key: RecipientKey = public_key.into();

    // Encrypt and send
    let encrypted = api.encrypt_text_msg(text, &recipient_key);
    let message_id = api
        .send(recipient, &encrypted, false)
        .await
        .context("Could not send message")?;
    Ok(message_id)
}

impl Notifier for ThreemaNotifier {
    fn notify(&self, message: &str) {
        for recipient in &self.recipients {
            let api = Arc::clone(&self.api);
            let recipient = recipient.clone();
            let text = message.to_string();
            self.runtime.spawn(async move {
                match send_message(&api, &recipient, &text).await {
                    Ok(message_id) => {
                        debug!("Sent notification to {} (message {})", recipient, message_id)
                    }
                    Err(e) => error!("Failed to notify {}: {:#}", recipient, e),
                }
            });
        }
    }
}
