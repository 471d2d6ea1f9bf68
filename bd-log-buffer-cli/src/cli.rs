// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Options {
  /// Buffering configuration file. Parsed as JSON if it ends in .json, YAML otherwise
  #[clap(env = "LOG_BUFFER_CONFIG", long)]
  pub config: PathBuf,

  /// JSON-lines file of records to replay. Reads stdin if omitted
  #[clap(long)]
  pub input: Option<PathBuf>,

  /// Input line that flushes every buffer
  #[clap(long, required = false, default_value = "flush")]
  pub flush_trigger: String,

  /// Input line that reloads the configuration file
  #[clap(long, required = false, default_value = "reload")]
  pub reload_trigger: String,
}
