// This file is part of PPE Compliance NVR, a workplace safety video
// monitoring system.
// Copyright (C) 2026 PPE Compliance NVR Authors.
// SPDX-License-Identifier: GPL-v3.0-or-later

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use bpaf::{Bpaf, Parser};
use tracing::{debug, error};

use ppe_nvr::cmds;

/// PPE compliance NVR: real-time hardhat/vest monitoring for camera feeds.
#[derive(Bpaf, Debug)]
#[bpaf(options, version(env!("CARGO_PKG_VERSION")))]
enum Args {
    Run(#[bpaf(external(cmds::run::args))] cmds::run::Args),
}

impl Args {
    fn run(self) -> Result<i32, base::Error> {
        match self {
            Args::Run(a) => cmds::run::run(a),
        }
    }
}

fn main() {
    base::tracing_setup::install();

    // Get the program name from the OS (e.g. if invoked as `target/debug/ppe-nvr`:
    // `ppe-nvr`), falling back to the crate name if conversion to a path/UTF-8
    // string fails. `bpaf`'s default logic is similar but doesn't have the fallback.
    let progname = std::env::args_os().next().map(PathBuf::from);
    let progname = progname
        .as_deref()
        .and_then(Path::file_name)
        .and_then(OsStr::to_str)
        .unwrap_or(env!("CARGO_PKG_NAME"));

    let args = match args()
        .fallback_to_usage()
        .run_inner(bpaf::Args::current_args().set_name(progname))
    {
        Ok(a) => a,
        Err(e) => std::process::exit(e.exit_code()),
    };
    tracing::trace!("Parsed command-line arguments: {args:#?}");

    match args.run() {
        Err(e) => {
            error!(err = %e.chain(), "exiting due to error");
            std::process::exit(1);
        }
        Ok(rv) => {
            debug!("exiting with status {}", rv);
            std::process::exit(rv)
        }
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn bpaf_invariants() {
        super::args().check_invariants(false);
    }
}
