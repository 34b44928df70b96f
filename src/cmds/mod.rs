// This file is part of PPE Compliance NVR, a workplace safety video
// monitoring system.
// Copyright (C) 2026 PPE Compliance NVR Authors.
// SPDX-License-Identifier: GPL-v3.0-or-later

//! Subcommands. The admin-side commands the teacher project grew over time
//! (database init/upgrade/login, ad hoc SQL) have no counterpart here: the
//! camera directory and accounts are owned by an external admin flow (§1),
//! so `run` is the only thing left to invoke.

pub mod run;
