//! Storefront button handlers and the interaction dispatcher.

use crate::application::lock::ResponseLock;
use crate::application::messages;
use crate::application::pipeline::{ActionOutcome, ActionPipeline, Preconditions, call};
use crate::application::purchase::PurchaseFlow;
use crate::application::registration::RegistrationFlow;
use crate::application::render::{self, DailyLimit};
use crate::config::ShopSettings;
use crate::domain::balance::{Balance, GrowId};
use crate::domain::interaction::{ActionKind, Interaction};
use crate::domain::keys;
use crate::domain::message::{Modal, Reply};
use crate::domain::ports::Backends;
use crate::domain::product::{Product, WorldInfo};
use crate::domain::transaction::TransactionRecord;
use crate::error::ShopError;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct Shop {
    pipeline: ActionPipeline,
}

impl Shop {
    pub fn new(backends: Backends, settings: Arc<ShopSettings>) -> Self {
        Self {
            pipeline: ActionPipeline::new(backends, ResponseLock::new(), settings),
        }
    }

    pub fn pipeline(&self) -> &ActionPipeline {
        &self.pipeline
    }

    /// Routes an interaction to its handler.
    pub async fn handle(&self, interaction: &Interaction) -> ActionOutcome {
        match interaction.kind {
            ActionKind::Register => self.register_button(interaction).await,
            ActionKind::Balance => self.balance(interaction).await,
            ActionKind::WorldInfo => self.world_info(interaction).await,
            ActionKind::Buy => self.buy_button(interaction).await,
            ActionKind::History => self.history(interaction).await,
            ActionKind::SubmitRegistration => {
                RegistrationFlow::new(&self.pipeline).submit(interaction).await
            }
            ActionKind::SubmitPurchase => {
                PurchaseFlow::new(&self.pipeline).submit(interaction).await
            }
        }
    }

    /// Opens the registration form, pre-filled with the current alias.
    pub async fn register_button(&self, interaction: &Interaction) -> ActionOutcome {
        let pipeline = &self.pipeline;
        let user = interaction.user;
        let limit_key = keys::register_limit(user);
        let checks = Preconditions::guarded(limit_key.clone());

        pipeline
            .run(interaction, checks, messages::GENERIC_FAILURE, || async move {
                let existing = match pipeline.lookup_growid(user).await {
                    Ok(existing) => existing,
                    Err(err) => {
                        debug!(user = %user, error = %err, "Alias pre-fill skipped");
                        None
                    }
                };
                let ttl = pipeline.settings().rate_limits.registration;
                pipeline.set_rate_limit(&limit_key, ttl).await;
                Ok(Reply::Modal(Modal::Registration { existing }))
            })
            .await
    }

    pub async fn balance(&self, interaction: &Interaction) -> ActionOutcome {
        let pipeline = &self.pipeline;
        let user = interaction.user;
        let checks = Preconditions::maintenance().with_blacklist();

        pipeline
            .run(interaction, checks, messages::BALANCE_FAILED, || async move {
                let settings = pipeline.settings();
                let growid = pipeline.require_growid(user).await?;

                let key = keys::balance(&growid);
                let balance = match pipeline.cached::<Balance>(&key).await {
                    Some(balance) => balance,
                    None => {
                        let fetch = pipeline.backends().balance.get_balance(&growid);
                        let balance = call("get_balance", settings.timeouts.read, fetch).await?;
                        pipeline.store(&key, &balance, settings.cache_ttls.balance).await;
                        balance
                    }
                };

                let recent = self.recent_transactions(&growid).await;
                let daily = self.daily_limit(&growid).await;
                Ok(Reply::Embed(render::balance_view(
                    &growid, balance, &recent, daily,
                )))
            })
            .await
    }

    pub async fn history(&self, interaction: &Interaction) -> ActionOutcome {
        let pipeline = &self.pipeline;
        let user = interaction.user;
        let checks = Preconditions::maintenance().with_blacklist();

        pipeline
            .run(interaction, checks, messages::HISTORY_FAILED, || async move {
                let settings = pipeline.settings();
                let growid = pipeline.require_growid(user).await?;

                let key = keys::history(user);
                let records = match pipeline.cached::<Vec<TransactionRecord>>(&key).await {
                    Some(records) => records,
                    None => {
                        let fetch = pipeline
                            .backends()
                            .balance
                            .get_transaction_history(&growid, settings.purchase.history_page);
                        let records =
                            call("get_transaction_history", settings.timeouts.read, fetch).await?;
                        pipeline.store(&key, &records, settings.cache_ttls.history).await;
                        records
                    }
                };

                if records.is_empty() {
                    return Err(ShopError::validation(messages::NO_HISTORY));
                }
                Ok(Reply::Embed(render::history_view(&growid, &records)))
            })
            .await
    }

    pub async fn world_info(&self, interaction: &Interaction) -> ActionOutcome {
        let pipeline = &self.pipeline;
        let checks = Preconditions::maintenance().with_blacklist();

        pipeline
            .run(interaction, checks, messages::WORLD_INFO_FAILED, || async move {
                let settings = pipeline.settings();
                let info = match pipeline.cached::<WorldInfo>(keys::WORLD_INFO).await {
                    Some(info) => info,
                    None => {
                        let fetch = pipeline.backends().products.get_world_info();
                        let info = call("get_world_info", settings.timeouts.read, fetch).await?;
                        pipeline
                            .store(keys::WORLD_INFO, &info, settings.cache_ttls.world_info)
                            .await;
                        info
                    }
                };
                Ok(Reply::Embed(render::world_info_view(&info)))
            })
            .await
    }

    /// Opens the purchase form listing every product currently in stock.
    pub async fn buy_button(&self, interaction: &Interaction) -> ActionOutcome {
        let pipeline = &self.pipeline;
        let user = interaction.user;
        let limit_key = keys::buy_button(user);
        let checks = Preconditions::guarded(limit_key.clone());

        pipeline
            .run(interaction, checks, messages::GENERIC_FAILURE, || async move {
                let settings = pipeline.settings();
                let queued = pipeline.backends().transactions.queue_len();
                if queued > settings.purchase.max_queue_size {
                    info!(queued, "Purchase queue saturated");
                    return Err(ShopError::Cooldown(messages::SYSTEM_BUSY.to_string()));
                }

                pipeline.require_growid(user).await?;

                let fetch = pipeline.backends().products.get_all_products();
                let products = call("get_all_products", settings.timeouts.read, fetch).await?;
                if products.is_empty() {
                    return Err(ShopError::validation(messages::NO_PRODUCTS));
                }

                let available = self.in_stock(products).await;
                if available.is_empty() {
                    return Err(ShopError::validation(messages::OUT_OF_STOCK));
                }

                pipeline
                    .set_rate_limit(&limit_key, settings.rate_limits.purchase_modal)
                    .await;
                Ok(Reply::Modal(Modal::Purchase {
                    products: available,
                }))
            })
            .await
    }

    /// Probes each product's stock. Products whose probe fails are left out.
    async fn in_stock(&self, products: Vec<Product>) -> Vec<Product> {
        let budget = self.pipeline.settings().timeouts.stock_probe;
        let catalog = &self.pipeline.backends().products;
        let mut available = Vec::with_capacity(products.len());

        for mut product in products {
            let probe = catalog.get_stock_count(&product.code);
            match call("get_stock_count", budget, probe).await {
                Ok(0) => {}
                Ok(stock) => {
                    product.stock = stock;
                    available.push(product);
                }
                Err(err) => {
                    debug!(product = %product.code, error = %err, "Stock probe failed, skipping")
                }
            }
        }
        available
    }

    async fn recent_transactions(&self, growid: &GrowId) -> Vec<TransactionRecord> {
        let settings = self.pipeline.settings();
        let fetch = self
            .pipeline
            .backends()
            .balance
            .get_transaction_history(growid, settings.purchase.history_preview);

        match call("get_transaction_history", settings.timeouts.read, fetch).await {
            Ok(records) => records,
            Err(err) => {
                warn!(growid = %growid, error = %err, "Recent transactions unavailable");
                Vec::new()
            }
        }
    }

    async fn daily_limit(&self, growid: &GrowId) -> Option<DailyLimit> {
        let read = self.pipeline.settings().timeouts.read;
        let balance = &self.pipeline.backends().balance;

        let (limit, usage) = tokio::join!(
            call("get_daily_limit", read, balance.get_daily_limit(growid)),
            call("get_daily_usage", read, balance.get_daily_usage(growid)),
        );
        match (limit, usage) {
            (Ok(limit), Ok(usage)) => Some(DailyLimit { limit, usage }),
            (Err(err), _) | (_, Err(err)) => {
                debug!(growid = %growid, error = %err, "Daily limit unavailable");
                None
            }
        }
    }
}
