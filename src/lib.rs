// Copyright 2019 Fullstop000 <fullstop1005@gmail.com>.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// See the License for the specific language governing permissions and
// limitations under the License.
#![deny(clippy::all)]
#![allow(clippy::module_inception)]
#![allow(clippy::needless_range_loop)]
#![allow(clippy::question_mark)]
#[macro_use]
extern crate log;
extern crate crossbeam_channel;
extern crate quick_error;
extern crate slog;
extern crate slog_async;
extern crate slog_term;

#[macro_use]
mod error;

pub mod archive;
mod logger;
pub mod manager;
pub mod options;
pub mod rotator;
pub mod storage;
pub mod watcher;

pub use error::{RotatorError, RotatorResult};
pub use options::Options;
pub use rotator::LogRotator;
