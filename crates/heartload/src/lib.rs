pub mod engine;
pub mod error;
pub mod metrics;

pub use engine::admission::{AdmissionPool, AdmissionToken};
pub use engine::classify::{classify, ErrorClass};
pub use engine::dialer::RandomDialer;
pub use engine::listener::{Acceptor, Listener};
pub use engine::supervisor::{ConnectionSupervisor, Disconnect};
pub use error::SimError;
pub use metrics::{MetricsSink, PrometheusSink};
