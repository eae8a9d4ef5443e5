//! End-to-end tests for GcpMon.
//!
//! All tests live under `tests/` and drive the agent through the public
//! `ToolRegistry` surface against either the scripted mock backend or the
//! REST backend pointed at a local mock server.
