//! Account-created event propagation: wire envelope, channel backends,
//! publisher, consumer loop and the outbox dispatcher.

pub mod channel;
pub mod consumer;
pub mod envelope;
pub mod memory;
pub mod outbox;
pub mod publisher;
pub mod redis;

pub use channel::{ChannelError, ChannelState, Delivery, MessageSink, MessageSource};
pub use consumer::{ConsumerHealth, DeliveryOutcome, EventConsumer, EventHandler, RedeliveryPolicy};
pub use envelope::{AccountCreated, EnvelopeError};
pub use memory::{DeadLetter, MemoryChannel};
pub use outbox::OutboxDispatcher;
pub use publisher::EventPublisher;
pub use self::redis::RedisChannel;
