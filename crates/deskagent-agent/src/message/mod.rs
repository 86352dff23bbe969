//! Inbound/outbound message queues and reply parsing (§4.4). Two durable
//! JSONL queues plus a pure `parse_reply` grammar; the agent loop is the only
//! caller that sequences them.

pub mod inbound;
pub mod outbound;
pub mod reply;

pub use inbound::InboundQueue;
pub use outbound::{DeliveryOutcome, Deliverers, OutboundRouter};
pub use reply::{parse_reply, ParsedReply};
