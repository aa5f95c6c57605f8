// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

/// The cancellation signal fired before the token was admitted. The sink is
/// left as if the token had never been presented.
#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
#[error("interrupted while waiting for fifo admission")]
pub struct Interrupted;
