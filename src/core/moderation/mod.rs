// Moderation review of firewall blocks.

pub mod review_models;
mod review_service;

pub use review_models::*;
pub use review_service::ModerationReviewer;
