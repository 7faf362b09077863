pub mod analytics;
pub mod chat_relay;
pub mod gateway;
pub mod insider;
pub mod match_list;
pub mod narrative;
pub mod payments;

pub use chat_relay::ChatRelay;
pub use gateway::SportsGateway;
pub use narrative::NarrativeGenerator;
pub use payments::PaymentGateway;
