//! Curator engine: classification transport, circuit breaker and the async driver loop.
mod breaker;
mod classifier;
mod client;
mod engine;
mod types;

pub use breaker::{BreakerState, CircuitBreaker};
pub use classifier::{Classifier, ClassifierSettings, HttpClassifier, KeywordClassifier};
pub use client::{Batch, ClassificationClient, ClientSettings};
pub use engine::{CurationEngine, EngineCommand, EngineHandle};
pub use types::{ClassifyError, ClassifyRequest, ClassifyResponse, WireDecision, WireItem};
