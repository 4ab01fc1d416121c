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

//! Resolution of Go module dependencies into cycle-free build rule parts.
//!
//! The pipeline is: [`mvs`] settles on one version per module, [`driver`]
//! loads packages from the downloaded sources, [`partition`] places every
//! package into a part of its module such that no two parts depend on each
//! other, and [`licence`] attributes a licence to every module.

pub mod download;
pub mod driver;
pub mod licence;
pub mod local_rules;
pub mod model;
pub mod mvs;
pub mod partition;
pub mod proxy;
pub mod update;
pub mod verify;
