// domed — adaptive dome tracking control core
// Copyright (C) 2024 Filip Szczerek <ga.software@yahoo.com>
//
// This file is part of domed
//
// domed is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License version 3
// as published by the Free Software Foundation.
//
// domed is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with domed.  If not, see <http://www.gnu.org/licenses/>.

//! Adaptive dome tracking control core: encoder feedback, motor pulsing,
//! celestial-object tracking and the file-based IPC used by the
//! `encoder_daemon`/`motor_service`/`domectl` binaries.

pub mod angle;
pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod encoder;
pub mod error;
pub mod feedback;
pub mod ipc;
pub mod motor;
pub mod tracking;

/// Git commit this binary was built from, embedded by `build.rs`;
/// `"unspecified"` outside a git checkout.
pub fn build_commit() -> &'static str {
    include_str!(concat!(env!("OUT_DIR"), "/version"))
}
