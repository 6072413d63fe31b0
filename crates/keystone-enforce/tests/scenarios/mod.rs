// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

mod albums;
mod artists;
mod field_gating;
mod lifecycle;
mod support;
mod tasks;
