//! Integration test harness.

mod api_flow;
mod sync_flow;
