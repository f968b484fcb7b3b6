// Copyright (c) BYD Profit Team
// SPDX-License-Identifier: Apache-2.0

pub mod commissions;
pub mod dividends;
pub mod health;
pub mod network;
pub mod plans;
pub mod users;
