//! Registration form submission: binds or rebinds a user's GrowID.

use crate::application::messages;
use crate::application::pipeline::{ActionOutcome, ActionPipeline, Preconditions, bounded, classify};
use crate::application::render;
use crate::domain::balance::GrowId;
use crate::domain::interaction::{Interaction, fields};
use crate::domain::keys;
use crate::domain::message::Reply;
use crate::domain::response::FailureReason;
use crate::error::ShopError;
use tracing::{debug, info};

pub struct RegistrationFlow<'a> {
    pipeline: &'a ActionPipeline,
}

impl<'a> RegistrationFlow<'a> {
    pub fn new(pipeline: &'a ActionPipeline) -> Self {
        Self { pipeline }
    }

    pub async fn submit(&self, interaction: &Interaction) -> ActionOutcome {
        let pipeline = self.pipeline;
        let user = interaction.user;
        let checks = Preconditions::maintenance().with_blacklist();

        pipeline
            .run(interaction, checks, messages::REGISTRATION_FAILED, || async move {
                let growid = GrowId::parse(interaction.field(fields::GROWID))?;

                // Only decides the wording, so a failed lookup reads as "new".
                let previous = match pipeline.lookup_growid(user).await {
                    Ok(previous) => previous,
                    Err(err) => {
                        debug!(user = %user, error = %err, "Previous alias lookup failed");
                        None
                    }
                };

                let budget = pipeline.settings().timeouts.registration;
                let register = pipeline.backends().balance.register_user(user, &growid);
                let registration = match bounded("register_user", budget, register).await? {
                    Ok(registration) => registration,
                    Err(failure) if failure.reason == FailureReason::LockBusy => {
                        return Err(ShopError::Cooldown(messages::REGISTRATION_BUSY.to_string()));
                    }
                    Err(failure) => return Err(classify(failure)),
                };

                let mut stale = vec![keys::balance(&growid), keys::history(user)];
                if let Some(previous) = previous.as_ref().filter(|previous| *previous != &growid) {
                    stale.push(keys::balance(previous));
                }
                pipeline.invalidate(&stale).await;

                info!(
                    user = %user,
                    growid = %growid,
                    updated = previous.is_some(),
                    "GrowID registered"
                );
                Ok(Reply::Embed(render::registration_success(
                    &growid,
                    previous.as_ref(),
                    &registration,
                )))
            })
            .await
    }
}
