// godeps: Third-party Go dependency management for the Please build system.
// Copyright (C) 2024 International Digital Economy Academy
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
//
// For inquiries, you can contact us via e-mail at jichuruanjian@idea.edu.cn.

use std::{any::Any, io::IsTerminal};

use clap::Parser;
use colored::*;
use tracing_subscriber::{Layer, layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod run;

fn init_tracing(flags: &cli::UniversalFlags) -> Box<dyn Any> {
    // e.g. RUST_LOG=godeps_resolve::mvs=debug godeps github.com/some/module/...

    let log_env_set = std::env::var("RUST_LOG").is_ok();
    let godeps_trace_env = std::env::var("GODEPS_TRACE").ok();
    let default_level = if flags.verbose {
        tracing::Level::DEBUG
    } else if flags.quiet {
        tracing::Level::ERROR
    } else {
        tracing::Level::INFO
    };
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let fmt = tracing_subscriber::fmt::layer()
        .with_ansi(std::io::stderr().is_terminal())
        .with_line_number(log_env_set)
        .with_level(true)
        .with_writer(std::io::stderr);
    let fmt = if !log_env_set {
        fmt.with_target(false).without_time().boxed()
    } else {
        fmt.compact().boxed()
    };

    let chrome_trace = if flags.trace {
        let chrome_filter = tracing_subscriber::EnvFilter::builder()
            .with_default_directive(tracing::Level::TRACE.into())
            .parse_lossy("");
        let (layer, guard) = tracing_chrome::ChromeLayerBuilder::new()
            .include_args(true)
            .file("trace.json")
            .build();

        Some((chrome_filter.and_then(layer), guard))
    } else if let Some(env) = godeps_trace_env.as_deref() {
        let chrome_filter = tracing_subscriber::EnvFilter::builder()
            .with_default_directive(tracing::Level::TRACE.into())
            .parse_lossy(env);
        let (layer, guard) = tracing_chrome::ChromeLayerBuilder::new()
            .include_args(true)
            .build();

        Some((chrome_filter.and_then(layer), guard))
    } else {
        None
    };

    let (chrome_layer, chrome_guard) = chrome_trace.unzip();

    let fmt_layer = fmt.with_filter(filter);
    // Also installs the bridge for `log` records.
    if let Err(e) = tracing_subscriber::registry()
        .with(fmt_layer)
        .with(chrome_layer)
        .try_init()
    {
        eprintln!("{}: failed to set up logging: {e}", "warning".yellow().bold());
    }

    Box::new(chrome_guard)
}

pub fn main() {
    let cli = cli::GodepsCli::parse();

    let _trace_guard = init_tracing(&cli.flags);

    let res = run::run_godeps(&cli);

    drop(_trace_guard);

    match res {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{}: {:?}", "error".red().bold(), e);
            std::process::exit(-1);
        }
    }
}
