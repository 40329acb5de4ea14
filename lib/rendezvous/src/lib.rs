// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

// Public trait API
mod manager;

// Store and its collaborators
pub mod config;
mod error;
pub mod hooks;
mod map;
mod sweep;

// Per-key synchronization (see slot/mod.rs for the state machine)
pub mod slot;

// ── Re-exports ───────────────────────────────────────────────────────

pub use config::{ConfigError, RendezvousConfig, RendezvousConfigBuilder};
pub use error::{RendezvousError, Result};
pub use hooks::{CancelledHook, CompletedHook, DuplicateHook, RendezvousHooks};
pub use manager::RendezvousManager;
pub use map::{RendezvousMap, RendezvousMapBuilder};
pub use slot::{Completion, CompletionStatus, Entry};
