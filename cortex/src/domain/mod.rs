// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain layer of the pattern cortex: signatures, candidates, stored
//! patterns and the events emitted as candidates move through promotion.

pub mod signature;
pub mod signature_codec;
pub mod pattern;
pub mod candidate;
pub mod events;

pub use signature::*;
pub use signature_codec::*;
pub use pattern::*;
pub use candidate::*;
pub use events::*;
