// This file is part of PPE Compliance NVR, a workplace safety video
// monitoring system.
// Copyright (C) 2026 PPE Compliance NVR Authors.
// SPDX-License-Identifier: GPL-v3.0-or-later

//! Thin re-export of `parking_lot`'s primitives under our own names, so
//! callers depend on `base::{Mutex, Condvar}` rather than on `parking_lot`
//! directly.

pub use parking_lot::Condvar;
pub use parking_lot::Mutex;
