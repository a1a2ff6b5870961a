// Copyright 2025 Ollamometer Contributors
// SPDX-License-Identifier: Apache-2.0

pub mod operations;
pub mod progress;
pub mod prometheus;
pub mod results;
pub mod status;
