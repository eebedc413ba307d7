// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Infrastructure layer: vector index backends, embedding provider, event bus

pub mod vector_index;
pub mod in_memory_index;
#[cfg(feature = "qdrant")]
pub mod qdrant_index;
pub mod embedding_client;
pub mod event_bus;

pub use vector_index::{DistanceMetric, IndexError, IndexHit, IndexRecord, MetadataFilter, Payload, VectorIndex};
pub use in_memory_index::InMemoryVectorIndex;
#[cfg(feature = "qdrant")]
pub use qdrant_index::QdrantVectorIndex;
pub use embedding_client::{EmbeddingError, EmbeddingProvider, HashEmbeddingClient};
pub use event_bus::{BroadcastEventBus, EventBus, EventBusError, EventReceiver};
