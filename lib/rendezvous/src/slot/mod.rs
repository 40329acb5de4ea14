// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Per-key storage: the single-assignment completion slot and the entry
//! record that carries it through the map.
//!
//! State machine of a slot:
//!
//! ```text
//! Pending ──resolve──▶ Resolved ──take──▶ Taken
//!    │
//!    └────fail───────▶ Failed ───take──▶ Taken
//! ```

mod completion;
mod entry;

pub use completion::{Completion, CompletionStatus};
pub use entry::Entry;
