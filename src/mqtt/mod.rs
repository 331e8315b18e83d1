pub mod connection;
pub mod supervisor;

pub use connection::{
    Broker, BrokerEvent, ConnectionManager, ConnectionState, MqttBroker, MqttNotifier, SessionEvent,
};
pub use supervisor::{Step, Supervisor};
