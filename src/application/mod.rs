//! Application layer: the user-action pipeline, the flows built on it and the
//! storefront message lifecycle.
//!
//! Every user action goes through [`pipeline::ActionPipeline`], which owns
//! the per-user response lock and turns any error into exactly one reply.
//! The storefront message is kept in sync by [`reconciler::StorefrontReconciler`].

pub mod lifecycle;
pub mod lock;
pub mod messages;
pub mod pipeline;
pub mod purchase;
pub mod reconciler;
pub mod registration;
pub mod render;
pub mod retry;
pub mod shop;
