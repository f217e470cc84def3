// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Query engine — request cache, segment store, planner, executor and
//! segment garbage collection.

pub mod cache;
pub mod executor;
pub mod gc;
pub mod planner;
pub mod store;
