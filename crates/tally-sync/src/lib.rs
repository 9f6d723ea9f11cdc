use std::thread;
use std::time::Duration;

use tally_telegram::{TelegramGateway, Update};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

// Pause after a failed update pull so a dead endpoint does not turn the
// pull loop into a busy spin.
const PULL_RETRY_PAUSE: Duration = Duration::from_secs(3);

pub fn compose_title(prefix: &str, count: u64) -> String {
    format!("{prefix}{count}")
}

/// Keeps the channel title in step with the member count. Owns the last
/// count it recorded; nothing else reads or writes it.
pub struct TitleSynchronizer {
    gateway: TelegramGateway,
    chat_id: i64,
    prefix: String,
    interval: Duration,
    last_known: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    FetchFailed,
    Unchanged,
    Applied(String),
    NotAcknowledged,
    RequestFailed,
}

impl TitleSynchronizer {
    pub fn new(
        gateway: TelegramGateway,
        chat_id: i64,
        prefix: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            gateway,
            chat_id,
            prefix: prefix.into(),
            interval,
            last_known: 0,
        }
    }

    pub fn run(mut self) {
        loop {
            thread::sleep(self.interval);
            self.tick();
        }
    }

    pub fn tick(&mut self) -> TickOutcome {
        tracing::debug!("starting title sync pass");
        let count = match self.gateway.get_chat_member_count(self.chat_id) {
            Ok(count) => count,
            Err(err) => {
                tracing::error!("cannot fetch member count: {err:#}");
                return TickOutcome::FetchFailed;
            }
        };
        if count == self.last_known {
            tracing::debug!(count, "member count unchanged");
            return TickOutcome::Unchanged;
        }

        // Recorded before the rename is confirmed; a failed request is
        // not retried until the live count moves again.
        self.last_known = count;
        let title = compose_title(&self.prefix, count);
        match self.gateway.set_chat_title(self.chat_id, &title) {
            Ok(ack) if ack.applied => {
                tracing::info!(%title, "channel title updated");
                TickOutcome::Applied(title)
            }
            Ok(_) => {
                tracing::error!(%title, "title change was not acknowledged");
                TickOutcome::NotAcknowledged
            }
            Err(err) => {
                tracing::error!("cannot change title: {err:#}");
                TickOutcome::RequestFailed
            }
        }
    }

    pub fn last_known(&self) -> u64 {
        self.last_known
    }
}

/// Deletes the "title changed" service messages the platform posts into
/// the channel. Stateless; reacts to one update at a time.
pub struct NotificationSuppressor {
    gateway: TelegramGateway,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressAction {
    Ignored,
    Deleted,
    DeleteFailed,
}

impl NotificationSuppressor {
    pub fn new(gateway: TelegramGateway) -> Self {
        Self { gateway }
    }

    pub fn run(&self, mut source: UpdateSource) {
        loop {
            for update in source.next_batch() {
                self.handle_update(&update);
            }
        }
    }

    pub fn handle_update(&self, update: &Update) -> SuppressAction {
        let Some(post) = update.channel_post.as_ref() else {
            return SuppressAction::Ignored;
        };
        if post.new_chat_title.as_deref().is_none_or(str::is_empty) {
            return SuppressAction::Ignored;
        }
        match self.gateway.delete_message(post.chat.id, post.message_id) {
            Ok(ack) => {
                tracing::info!(
                    chat_id = post.chat.id,
                    message_id = post.message_id,
                    %ack,
                    "deleted title notification"
                );
                SuppressAction::Deleted
            }
            Err(err) => {
                tracing::error!("cannot delete title notification: {err:#}");
                SuppressAction::DeleteFailed
            }
        }
    }
}

/// The one update-event stream, resolved once at startup. Both variants
/// expose the same blocking pull.
pub enum UpdateSource {
    LongPolling(PollingSource),
    Webhook(WebhookSource),
}

impl UpdateSource {
    pub fn long_polling(gateway: TelegramGateway, timeout_secs: u64) -> Self {
        Self::LongPolling(PollingSource {
            gateway,
            timeout_secs,
            offset: 0,
        })
    }

    pub fn webhook(updates: UnboundedReceiver<Update>, keepalive: UnboundedSender<Update>) -> Self {
        Self::Webhook(WebhookSource {
            updates,
            _keepalive: keepalive,
        })
    }

    /// Blocks until the next batch of updates arrives. A failed pull
    /// yields an empty batch after a short pause.
    pub fn next_batch(&mut self) -> Vec<Update> {
        match self {
            Self::LongPolling(source) => source.next_batch(),
            Self::Webhook(source) => source.next_batch(),
        }
    }
}

pub struct PollingSource {
    gateway: TelegramGateway,
    timeout_secs: u64,
    offset: i64,
}

impl PollingSource {
    fn next_batch(&mut self) -> Vec<Update> {
        match self.gateway.get_updates(self.offset, self.timeout_secs) {
            Ok(updates) => {
                // Confirm delivery: the next pull starts past the
                // newest update we have seen.
                if let Some(last) = updates.last() {
                    self.offset = last.update_id + 1;
                }
                updates
            }
            Err(err) => {
                tracing::error!("cannot pull updates: {err:#}");
                thread::sleep(PULL_RETRY_PAUSE);
                Vec::new()
            }
        }
    }
}

pub struct WebhookSource {
    updates: UnboundedReceiver<Update>,
    // Held so the channel never closes if the listener thread dies; the
    // stream then blocks, matching the polling variant's behavior on a
    // dead endpoint.
    _keepalive: UnboundedSender<Update>,
}

impl WebhookSource {
    fn next_batch(&mut self) -> Vec<Update> {
        match self.updates.blocking_recv() {
            Some(update) => vec![update],
            None => Vec::new(),
        }
    }
}
