//! In-process stand-ins for the chat platform: a message board and the stock
//! display that renders onto it.

use crate::domain::message::{
    ChannelId, Embed, MessageEdit, MessageId, ShopView, Tone, ViewUpdate,
};
use crate::domain::ports::{
    GatewayError, MessageGateway, ProductServiceRef, StockDisplay, StockDisplayError,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{RwLock, watch};
use tracing::debug;

pub const STOCK_TITLE: &str = "🏪 Live Stock";

/// A message as the platform currently shows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub channel: ChannelId,
    pub embed: Embed,
    pub view: Option<ShopView>,
}

#[derive(Debug, Default)]
struct Board {
    channels: HashSet<ChannelId>,
    messages: BTreeMap<MessageId, StoredMessage>,
    next_id: u64,
}

#[derive(Debug, Default)]
pub struct InMemoryGateway {
    board: RwLock<Board>,
    sends: AtomicUsize,
    edits: AtomicUsize,
    reject_edits: AtomicBool,
}

impl InMemoryGateway {
    pub fn with_channel(channel: ChannelId) -> Self {
        let mut board = Board::default();
        board.channels.insert(channel);
        Self {
            board: RwLock::new(board),
            ..Self::default()
        }
    }

    pub async fn message(&self, id: MessageId) -> Option<StoredMessage> {
        self.board.read().await.messages.get(&id).cloned()
    }

    /// Simulates a moderator deleting a message.
    pub async fn remove_message(&self, id: MessageId) {
        self.board.write().await.messages.remove(&id);
    }

    pub async fn last_message_in(&self, channel: ChannelId) -> Option<MessageId> {
        let board = self.board.read().await;
        board
            .messages
            .iter()
            .rev()
            .find(|(_, message)| message.channel == channel)
            .map(|(id, _)| *id)
    }

    pub async fn message_count(&self) -> usize {
        self.board.read().await.messages.len()
    }

    pub fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn edits(&self) -> usize {
        self.edits.load(Ordering::SeqCst)
    }

    pub fn set_reject_edits(&self, reject: bool) {
        self.reject_edits.store(reject, Ordering::SeqCst);
    }
}

#[async_trait]
impl MessageGateway for InMemoryGateway {
    async fn channel_accessible(&self, channel: ChannelId) -> bool {
        self.board.read().await.channels.contains(&channel)
    }

    async fn send(
        &self,
        channel: ChannelId,
        embed: Embed,
        view: Option<ShopView>,
    ) -> Result<MessageId, GatewayError> {
        let mut board = self.board.write().await;
        if !board.channels.contains(&channel) {
            return Err(GatewayError::ChannelUnavailable(channel));
        }
        board.next_id += 1;
        let id = MessageId(board.next_id);
        board.messages.insert(
            id,
            StoredMessage {
                channel,
                embed,
                view,
            },
        );
        self.sends.fetch_add(1, Ordering::SeqCst);
        debug!(channel = %channel, message = %id, "Message sent");
        Ok(id)
    }

    async fn edit(
        &self,
        channel: ChannelId,
        message: MessageId,
        edit: MessageEdit,
    ) -> Result<(), GatewayError> {
        if self.reject_edits.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected("edit rejected".to_string()));
        }
        let mut board = self.board.write().await;
        if !board.channels.contains(&channel) {
            return Err(GatewayError::ChannelUnavailable(channel));
        }
        let stored = board
            .messages
            .get_mut(&message)
            .filter(|stored| stored.channel == channel)
            .ok_or(GatewayError::NotFound(message))?;

        if let Some(embed) = edit.embed {
            stored.embed = embed;
        }
        match edit.view {
            ViewUpdate::Keep => {}
            ViewUpdate::Attach(view) => stored.view = Some(view),
            ViewUpdate::Detach => stored.view = None,
        }
        self.edits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Stock display that renders the product catalog onto a gateway message.
pub struct InMemoryStockDisplay {
    gateway: Arc<InMemoryGateway>,
    products: ProductServiceRef,
    channel: ChannelId,
    ready: watch::Sender<bool>,
    current: RwLock<Option<MessageId>>,
    updates: AtomicUsize,
    failing: AtomicBool,
}

impl InMemoryStockDisplay {
    /// A display whose stock data is already loaded.
    pub fn new(
        gateway: Arc<InMemoryGateway>,
        products: ProductServiceRef,
        channel: ChannelId,
    ) -> Self {
        let display = Self::pending(gateway, products, channel);
        display.mark_ready();
        display
    }

    /// A display that reports ready only after [`Self::mark_ready`].
    pub fn pending(
        gateway: Arc<InMemoryGateway>,
        products: ProductServiceRef,
        channel: ChannelId,
    ) -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            gateway,
            products,
            channel,
            ready,
            current: RwLock::new(None),
            updates: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    pub fn mark_ready(&self) {
        self.ready.send_replace(true);
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StockDisplay for InMemoryStockDisplay {
    async fn wait_ready(&self) {
        let mut ready = self.ready.subscribe();
        // The sender lives as long as `self`, so this only returns once ready.
        let _ = ready.wait_for(|ready| *ready).await;
    }

    async fn current_message(&self) -> Option<MessageId> {
        *self.current.read().await
    }

    async fn set_current_message(&self, message: Option<MessageId>) {
        *self.current.write().await = message;
    }

    async fn find_last_message(&self) -> Result<Option<MessageId>, StockDisplayError> {
        Ok(self.gateway.last_message_in(self.channel).await)
    }

    async fn create_stock_embed(&self) -> Result<Embed, StockDisplayError> {
        if !self.is_ready() {
            return Err(StockDisplayError::NotReady);
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(StockDisplayError::Failed("stock source offline".to_string()));
        }
        let products = self
            .products
            .get_all_products()
            .await
            .map_err(|failure| StockDisplayError::Failed(failure.to_string()))?;

        let mut embed = Embed::new(STOCK_TITLE, Tone::Info).timestamp(Utc::now());
        if products.is_empty() {
            return Ok(embed.description("No products available."));
        }
        for product in products {
            let stock = self.products.get_stock_count(&product.code).await.unwrap_or(0);
            embed.push_field(
                product.name,
                format!(
                    "```yml\nCode  : {}\nPrice : {}\nStock : {}\n```",
                    product.code, product.price, stock
                ),
            );
        }
        Ok(embed.footer("Prices in World Locks"))
    }

    async fn update_stock_display(&self) -> Result<(), StockDisplayError> {
        let Some(message) = self.current_message().await else {
            return Err(StockDisplayError::Failed("no stock message to update".to_string()));
        };
        let embed = self.create_stock_embed().await?;
        let edit = MessageEdit {
            embed: Some(embed),
            view: ViewUpdate::Keep,
        };
        self.gateway
            .edit(self.channel, message, edit)
            .await
            .map_err(|err| StockDisplayError::Failed(err.to_string()))?;
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
