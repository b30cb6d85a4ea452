pub mod alerting;
pub mod database;
pub mod repositories;

pub use alerting::{FanOutAlertSink, MongoAlertSink, TracingAlertSink};
