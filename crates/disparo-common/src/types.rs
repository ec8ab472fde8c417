//! Common types for Disparo

use uuid::Uuid;

/// Unique identifier for campaigns
pub type CampaignId = Uuid;

/// Unique identifier for message templates
pub type MessageId = Uuid;

/// Unique identifier for contacts
pub type ContactId = Uuid;

/// Unique identifier for recovery rules
pub type RuleId = Uuid;

/// Unique identifier for recovery flow steps
pub type FlowStepId = Uuid;

/// Unique identifier for monitored conversations
pub type ConversationId = Uuid;
