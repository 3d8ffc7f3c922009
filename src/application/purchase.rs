//! Purchase form submission.
//!
//! Small orders are processed inline and answered with the final result.
//! Orders above the queue threshold are handed to the transaction queue and
//! acknowledged immediately; their completion is reported out-of-band.

use crate::application::messages;
use crate::application::pipeline::{
    ActionOutcome, ActionPipeline, Preconditions, bounded, call, classify,
};
use crate::application::render;
use crate::domain::balance::GrowId;
use crate::domain::interaction::{Interaction, fields};
use crate::domain::keys;
use crate::domain::message::Reply;
use crate::domain::product::ProductCode;
use crate::domain::transaction::{
    PurchaseRequest, PurchaseRoute, Quantity, QueuedPurchase, TransactionType,
};
use crate::error::{ErrorKind, Result};
use chrono::Utc;
use tracing::{error, info, warn};

pub struct PurchaseFlow<'a> {
    pipeline: &'a ActionPipeline,
}

impl<'a> PurchaseFlow<'a> {
    pub fn new(pipeline: &'a ActionPipeline) -> Self {
        Self { pipeline }
    }

    pub async fn submit(&self, interaction: &Interaction) -> ActionOutcome {
        let pipeline = self.pipeline;
        let user = interaction.user;
        let limit_key = keys::purchase_limit(user);
        let checks = Preconditions::guarded(limit_key.clone());

        pipeline
            .run(interaction, checks, messages::TRANSACTION_FAILED, || async move {
                let settings = pipeline.settings();
                let request = PurchaseRequest {
                    buyer: user,
                    product: ProductCode::parse(interaction.field(fields::PRODUCT_CODE))?,
                    quantity: Quantity::parse(interaction.field(fields::QUANTITY))?,
                };
                let growid = pipeline.require_growid(user).await?;

                pipeline
                    .set_rate_limit(&limit_key, settings.rate_limits.purchase_submit)
                    .await;

                match request.route(settings.purchase.queue_threshold) {
                    PurchaseRoute::Queued => self.enqueue(&request, growid).await,
                    PurchaseRoute::Immediate => self.purchase_now(&request, &growid).await,
                }
            })
            .await
    }

    async fn enqueue(&self, request: &PurchaseRequest, growid: GrowId) -> Result<Reply> {
        let budget = self.pipeline.settings().timeouts.purchase;
        let job = QueuedPurchase {
            r#type: TransactionType::Purchase,
            user_id: request.buyer,
            growid,
            product_code: request.product.clone(),
            quantity: request.quantity.value(),
            timestamp: Utc::now(),
        };

        let transactions = &self.pipeline.backends().transactions;
        call("enqueue", budget, transactions.enqueue(job)).await?;
        info!(
            buyer = %request.buyer,
            product = %request.product,
            quantity = request.quantity.value(),
            "Purchase queued"
        );
        Ok(Reply::Embed(render::purchase_queued()))
    }

    async fn purchase_now(&self, request: &PurchaseRequest, growid: &GrowId) -> Result<Reply> {
        let budget = self.pipeline.settings().timeouts.purchase;
        let transactions = &self.pipeline.backends().transactions;
        let purchase = transactions.process_purchase(
            request.buyer,
            &request.product,
            request.quantity.value(),
        );

        let receipt = match bounded("process_purchase", budget, purchase).await? {
            Ok(receipt) => receipt,
            Err(failure) => {
                let transaction_id = failure.transaction_id.clone();
                let err = classify(failure);
                if err.kind() == ErrorKind::Unclassified {
                    self.compensate(transaction_id.as_deref()).await;
                }
                return Err(err);
            }
        };

        self.pipeline
            .invalidate(&[
                keys::balance(growid),
                keys::stock(&request.product),
                keys::history(request.buyer),
            ])
            .await;
        info!(
            buyer = %request.buyer,
            transaction_id = %receipt.transaction_id,
            total = %receipt.total_price,
            "Purchase completed"
        );
        Ok(Reply::Embed(render::purchase_success(&receipt)))
    }

    /// Best-effort rollback of a purchase the backend may have partially applied.
    async fn compensate(&self, transaction_id: Option<&str>) {
        let Some(transaction_id) = transaction_id else {
            warn!("Purchase failed without a transaction id, nothing to recover");
            return;
        };
        let budget = self.pipeline.settings().timeouts.recovery;
        let transactions = &self.pipeline.backends().transactions;
        let recovery = transactions.recover_failed_transaction(transaction_id);

        match call("recover_failed_transaction", budget, recovery).await {
            Ok(()) => info!(transaction_id, "Failed transaction recovered"),
            Err(err) => error!(transaction_id, error = %err, "Transaction recovery failed"),
        }
    }
}
