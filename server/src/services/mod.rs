//! Domain services used by the HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own business logic and persistence concerns so route
//! handlers can stay focused on protocol translation and broadcast wiring.

pub mod contact;
pub mod funnel;
pub mod lead;
pub mod stage;
